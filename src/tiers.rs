//! Speaker-partitioned word and phone tiers of one recording.

use crate::corpus::Corpus;
use crate::ctm::line::Interval;
use std::collections::{BTreeMap, HashSet};

/// Word and phone tiers of one speaker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeakerTiers {
    pub words: Vec<Interval>,
    pub phones: Vec<Interval>,
}

impl SpeakerTiers {
    pub fn interval_count(&self) -> usize {
        self.words.len() + self.phones.len()
    }

    /// Appends `other` and restores begin-time order (stable for equal starts).
    pub fn extend(&mut self, other: SpeakerTiers) {
        self.words.extend(other.words);
        self.phones.extend(other.phones);
        self.sort();
    }

    fn sort(&mut self) {
        self.words.sort_by(|a, b| a.begin.total_cmp(&b.begin));
        self.phones.sort_by(|a, b| a.begin.total_cmp(&b.begin));
    }
}

/// Merged word and phone tiers of one recording, keyed by speaker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TierSet {
    pub recording: String,
    pub speakers: BTreeMap<String, SpeakerTiers>,
}

impl TierSet {
    pub fn new(recording: impl Into<String>) -> Self {
        Self {
            recording: recording.into(),
            speakers: BTreeMap::new(),
        }
    }

    pub fn speaker_count(&self) -> usize {
        self.speakers.len()
    }

    pub fn interval_count(&self) -> usize {
        self.speakers.values().map(SpeakerTiers::interval_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.speakers.is_empty()
    }

    /// Accumulates another delivery for the same recording.
    pub fn merge(&mut self, other: TierSet) {
        for (speaker, tiers) in other.speakers {
            match self.speakers.get_mut(&speaker) {
                Some(existing) => existing.extend(tiers),
                None => {
                    self.speakers.insert(speaker, tiers);
                }
            }
        }
    }
}

/// Word and phone labels of one utterance after the join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedUtterance {
    pub id: String,
    pub words: Vec<Interval>,
    pub phones: Vec<Interval>,
}

/// Labels removed from tiers when cleanup is enabled.
#[derive(Debug, Clone, Default)]
pub struct CleanupRules {
    silence_words: HashSet<String>,
    silence_phones: HashSet<String>,
}

impl CleanupRules {
    pub fn new(silence_words: &[String], silence_phones: &[String]) -> Self {
        Self {
            silence_words: silence_words.iter().cloned().collect(),
            silence_phones: silence_phones.iter().cloned().collect(),
        }
    }

    /// Drops silence labels and empty intervals.
    pub fn apply(&self, tiers: &mut SpeakerTiers) {
        tiers
            .words
            .retain(|i| i.end > i.begin && !self.silence_words.contains(&i.label));
        tiers
            .phones
            .retain(|i| i.end > i.begin && !self.silence_phones.contains(&i.label));
    }
}

/// Partitions joined utterances of `recording` by speaker.
///
/// Utterances are laid out in recording-time order; an utterance missing
/// from the registry is an error naming it.
pub fn build_tier_set(
    corpus: &Corpus,
    recording: &str,
    joined: Vec<JoinedUtterance>,
    cleanup: Option<&CleanupRules>,
) -> Result<TierSet, String> {
    let mut located = Vec::with_capacity(joined.len());
    for utterance in joined {
        let info = corpus
            .utterance(&utterance.id)
            .ok_or_else(|| format!("utterance {} is not registered", utterance.id))?;
        if info.recording != recording {
            return Err(format!(
                "utterance {} belongs to {}, not {}",
                utterance.id, info.recording, recording
            ));
        }
        located.push((info.begin, info.speaker.clone(), utterance));
    }
    located.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.2.id.cmp(&b.2.id)));

    let mut tier_set = TierSet::new(recording);
    for (_, speaker, utterance) in located {
        let tiers = tier_set.speakers.entry(speaker).or_default();
        tiers.words.extend(utterance.words);
        tiers.phones.extend(utterance.phones);
    }

    for tiers in tier_set.speakers.values_mut() {
        tiers.sort();
        if let Some(rules) = cleanup {
            rules.apply(tiers);
        }
    }
    Ok(tier_set)
}
