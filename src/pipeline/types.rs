//! Messages passed between pipeline stages.

use crate::ctm::line::Interval;
use crate::tiers::TierSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which alignment stream a label belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    Word,
    Phone,
}

impl LabelKind {
    pub fn opposite(self) -> Self {
        match self {
            LabelKind::Word => LabelKind::Phone,
            LabelKind::Phone => LabelKind::Word,
        }
    }

    /// Plural used in tier names.
    pub fn tier_suffix(self) -> &'static str {
        match self {
            LabelKind::Word => "words",
            LabelKind::Phone => "phones",
        }
    }
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelKind::Word => write!(f, "word"),
            LabelKind::Phone => write!(f, "phone"),
        }
    }
}

/// One grouper's delivery of mapped labels for (part of) a recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub kind: LabelKind,
    pub job: usize,
    pub recording: String,
    /// Utterance id → intervals in recording-absolute time, in scan order.
    pub utterances: BTreeMap<String, Vec<Interval>>,
}

impl Bundle {
    pub fn new(kind: LabelKind, job: usize, recording: impl Into<String>) -> Self {
        Self {
            kind,
            job,
            recording: recording.into(),
            utterances: BTreeMap::new(),
        }
    }

    pub fn interval_count(&self) -> usize {
        self.utterances.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    /// Folds a later delivery of the same kind and recording into this one.
    pub fn merge(&mut self, other: Bundle) {
        for (utterance, intervals) in other.utterances {
            self.utterances
                .entry(utterance)
                .or_default()
                .extend(intervals);
        }
    }
}

/// A recording ready for the writer pool.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingExport {
    pub tiers: TierSet,
    /// False when forwarded at shutdown without every speaker present.
    pub complete: bool,
}

impl RecordingExport {
    pub fn complete(tiers: TierSet) -> Self {
        Self {
            tiers,
            complete: true,
        }
    }

    pub fn partial(tiers: TierSet) -> Self {
        Self {
            tiers,
            complete: false,
        }
    }

    pub fn recording(&self) -> &str {
        &self.tiers.recording
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_kind_display_and_opposite() {
        assert_eq!(LabelKind::Word.to_string(), "word");
        assert_eq!(LabelKind::Phone.to_string(), "phone");
        assert_eq!(LabelKind::Word.opposite(), LabelKind::Phone);
        assert_eq!(LabelKind::Phone.tier_suffix(), "phones");
    }

    #[test]
    fn test_bundle_merge_extends_utterances() {
        let mut first = Bundle::new(LabelKind::Word, 0, "rec");
        first
            .utterances
            .insert("u1".into(), vec![Interval::new("u1", 0.0, 0.5, "a")]);

        let mut second = Bundle::new(LabelKind::Word, 0, "rec");
        second
            .utterances
            .insert("u1".into(), vec![Interval::new("u1", 0.5, 0.9, "b")]);
        second
            .utterances
            .insert("u2".into(), vec![Interval::new("u2", 2.0, 2.4, "c")]);

        first.merge(second);

        assert_eq!(first.utterances.len(), 2);
        assert_eq!(first.interval_count(), 3);
        assert_eq!(first.utterances["u1"][1].label, "b");
    }

    #[test]
    fn test_recording_export_constructors() {
        let export = RecordingExport::partial(TierSet::new("rec"));
        assert!(!export.complete);
        assert_eq!(export.recording(), "rec");
        assert!(RecordingExport::complete(TierSet::new("rec")).complete);
    }
}
