//! Praat TextGrid rendering (long text format).

use crate::export::document::{Annotation, Tier, TierInterval};
use std::fmt;

/// Renders `annotation` as a long-format TextGrid.
///
/// Interval tiers must cover `xmin..xmax` without holes, so gaps between
/// labels are filled with empty intervals. Overlapping labels are clipped to
/// the end of their predecessor and dropped when nothing is left.
pub fn render(annotation: &Annotation) -> String {
    TextGrid(annotation).to_string()
}

/// Display adapter writing an annotation in TextGrid syntax.
pub struct TextGrid<'a>(pub &'a Annotation);

impl fmt::Display for TextGrid<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let annotation = self.0;
        writeln!(f, "File type = \"ooTextFile\"")?;
        writeln!(f, "Object class = \"TextGrid\"")?;
        writeln!(f)?;
        writeln!(f, "xmin = {} ", annotation.xmin)?;
        writeln!(f, "xmax = {} ", annotation.xmax)?;
        if annotation.tiers.is_empty() {
            return writeln!(f, "tiers? <absent> ");
        }
        writeln!(f, "tiers? <exists> ")?;
        writeln!(f, "size = {} ", annotation.tiers.len())?;
        writeln!(f, "item []: ")?;

        for (index, tier) in annotation.tiers.iter().enumerate() {
            let intervals = fill_gaps(tier, annotation.xmin, annotation.xmax);
            writeln!(f, "    item [{}]:", index + 1)?;
            writeln!(f, "        class = \"IntervalTier\" ")?;
            writeln!(f, "        name = \"{}\" ", escape(&tier.name))?;
            writeln!(f, "        xmin = {} ", annotation.xmin)?;
            writeln!(f, "        xmax = {} ", annotation.xmax)?;
            writeln!(f, "        intervals: size = {} ", intervals.len())?;
            for (n, interval) in intervals.iter().enumerate() {
                writeln!(f, "        intervals [{}]:", n + 1)?;
                writeln!(f, "            xmin = {} ", interval.begin)?;
                writeln!(f, "            xmax = {} ", interval.end)?;
                writeln!(f, "            text = \"{}\" ", escape(&interval.label))?;
            }
        }
        Ok(())
    }
}

fn fill_gaps(tier: &Tier, xmin: f64, xmax: f64) -> Vec<TierInterval> {
    let mut filled = Vec::with_capacity(tier.intervals.len() * 2 + 1);
    let mut cursor = xmin;
    for interval in &tier.intervals {
        let begin = interval.begin.max(cursor);
        let end = interval.end.min(xmax);
        if end <= begin {
            continue;
        }
        if begin > cursor {
            filled.push(empty(cursor, begin));
        }
        filled.push(TierInterval {
            begin,
            end,
            label: interval.label.clone(),
        });
        cursor = end;
    }
    if cursor < xmax {
        filled.push(empty(cursor, xmax));
    }
    filled
}

fn empty(begin: f64, end: f64) -> TierInterval {
    TierInterval {
        begin,
        end,
        label: String::new(),
    }
}

fn escape(text: &str) -> String {
    text.replace('"', "\"\"")
}
