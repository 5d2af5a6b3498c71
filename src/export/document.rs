//! Format-neutral annotation document built from a recording's tiers.

use crate::corpus::Recording;
use crate::ctm::line::Interval;
use crate::defaults::{TIME_DECIMALS, round_to};
use crate::pipeline::types::LabelKind;
use crate::tiers::TierSet;
use serde::Serialize;

/// One labelled span of an exported tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierInterval {
    pub begin: f64,
    pub end: f64,
    pub label: String,
}

/// One tier of one speaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tier {
    pub name: String,
    pub speaker: String,
    pub kind: LabelKind,
    pub intervals: Vec<TierInterval>,
}

/// A recording's exported annotation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub recording: String,
    pub xmin: f64,
    pub xmax: f64,
    pub tiers: Vec<Tier>,
}

impl Annotation {
    pub fn interval_count(&self) -> usize {
        self.tiers.iter().map(|tier| tier.intervals.len()).sum()
    }
}

/// Tier name for `speaker`'s `kind` labels.
///
/// Single-speaker recordings use the bare kind name.
pub fn tier_name(recording: &Recording, speaker: &str, kind: LabelKind) -> String {
    if recording.is_multi_speaker() {
        format!("{} - {}", speaker, kind.tier_suffix())
    } else {
        kind.tier_suffix().to_string()
    }
}

/// Lays out `tiers` in the recording's speaker ordering, words before
/// phones, with times snapped to `frame_shift` seconds.
pub fn build_annotation(recording: &Recording, tiers: &TierSet, frame_shift: f64) -> Annotation {
    let max_end = tiers
        .speakers
        .values()
        .flat_map(|s| s.words.iter().chain(s.phones.iter()))
        .map(|i| i.end)
        .fold(0.0_f64, f64::max);
    let duration = recording.duration.filter(|d| *d > 0.0);
    let xmax = match duration {
        Some(d) if max_end <= d + frame_shift => d,
        _ => snap(max_end, frame_shift).max(duration.unwrap_or(0.0)),
    };

    let mut ordering: Vec<&str> = recording.speakers.iter().map(String::as_str).collect();
    let mut unlisted: Vec<&str> = tiers
        .speakers
        .keys()
        .map(String::as_str)
        .filter(|s| !recording.speakers.iter().any(|known| known == s))
        .collect();
    unlisted.sort_unstable();
    ordering.extend(unlisted);

    let mut out = Vec::with_capacity(tiers.speakers.len() * 2);
    for speaker in ordering {
        let Some(speaker_tiers) = tiers.speakers.get(speaker) else {
            continue;
        };
        for (kind, intervals) in [
            (LabelKind::Word, &speaker_tiers.words),
            (LabelKind::Phone, &speaker_tiers.phones),
        ] {
            out.push(Tier {
                name: tier_name(recording, speaker, kind),
                speaker: speaker.to_string(),
                kind,
                intervals: intervals
                    .iter()
                    .map(|i| snap_interval(i, frame_shift, xmax))
                    .collect(),
            });
        }
    }

    Annotation {
        recording: recording.name.clone(),
        xmin: 0.0,
        xmax,
        tiers: out,
    }
}

fn snap(time: f64, frame_shift: f64) -> f64 {
    if frame_shift <= 0.0 {
        return round_to(time, TIME_DECIMALS);
    }
    round_to((time / frame_shift).round() * frame_shift, TIME_DECIMALS)
}

fn snap_interval(interval: &Interval, frame_shift: f64, xmax: f64) -> TierInterval {
    let begin = snap(interval.begin, frame_shift);
    let mut end = snap(interval.end, frame_shift);
    if (xmax - end).abs() <= frame_shift {
        end = xmax;
    }
    TierInterval {
        begin,
        end,
        label: interval.label.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiers::SpeakerTiers;

    fn tiers(speakers: &[&str]) -> TierSet {
        let mut set = TierSet::new("rec");
        for speaker in speakers {
            set.speakers.insert(
                speaker.to_string(),
                SpeakerTiers {
                    words: vec![Interval::new("u", 0.1234, 0.9876, "hello")],
                    phones: vec![
                        Interval::new("u", 0.1234, 0.5, "HH"),
                        Interval::new("u", 0.5, 0.9876, "OW"),
                    ],
                },
            );
        }
        set
    }

    #[test]
    fn test_single_speaker_tier_names() {
        let recording = Recording::new("rec", vec!["a".into()]);
        let annotation = build_annotation(&recording, &tiers(&["a"]), 0.01);
        let names: Vec<&str> = annotation.tiers.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["words", "phones"]);
        assert_eq!(annotation.interval_count(), 3);
    }

    #[test]
    fn test_multi_speaker_tiers_follow_speaker_ordering() {
        let recording = Recording::new("rec", vec!["zed".into(), "amy".into()]);
        let annotation = build_annotation(&recording, &tiers(&["amy", "zed"]), 0.01);
        let names: Vec<&str> = annotation.tiers.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["zed - words", "zed - phones", "amy - words", "amy - phones"]
        );
    }

    #[test]
    fn test_missing_speaker_is_omitted() {
        let recording = Recording::new("rec", vec!["a".into(), "b".into()]);
        let annotation = build_annotation(&recording, &tiers(&["b"]), 0.01);
        assert_eq!(annotation.tiers.len(), 2);
        assert_eq!(annotation.tiers[0].speaker, "b");
    }

    #[test]
    fn test_times_snap_to_frame_shift() {
        let recording = Recording::new("rec", vec!["a".into()]);
        let annotation = build_annotation(&recording, &tiers(&["a"]), 0.01);
        let word = &annotation.tiers[0].intervals[0];
        assert_eq!(word.begin, 0.12);
        assert_eq!(word.end, 0.99);
        assert_eq!(annotation.xmax, 0.99);
    }

    #[test]
    fn test_end_near_duration_snaps_to_duration() {
        let recording = Recording::new("rec", vec!["a".into()]).with_duration(0.995);
        let annotation = build_annotation(&recording, &tiers(&["a"]), 0.01);
        assert_eq!(annotation.xmax, 0.995);
        assert_eq!(annotation.tiers[0].intervals[0].end, 0.995);
    }

    #[test]
    fn test_duration_longer_than_labels_is_kept() {
        let recording = Recording::new("rec", vec!["a".into()]).with_duration(3.0);
        let annotation = build_annotation(&recording, &tiers(&["a"]), 0.01);
        assert_eq!(annotation.xmax, 3.0);
        assert_eq!(annotation.tiers[0].intervals[0].end, 0.99);
    }
}
