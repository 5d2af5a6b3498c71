//! Joins word and phone bundles of one job into per-speaker tier fragments.

use crate::corpus::Corpus;
use crate::pipeline::error::{ErrorKey, ErrorRecord, Fault, StationError};
use crate::pipeline::station::Station;
use crate::pipeline::types::{Bundle, LabelKind};
use crate::tiers::{CleanupRules, JoinedUtterance, TierSet, build_tier_set};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct PendingRecording {
    words: Option<Bundle>,
    phones: Option<Bundle>,
    /// At least one utterance of this recording was joined.
    paired: bool,
}

impl PendingRecording {
    fn slot(&mut self, kind: LabelKind) -> &mut Option<Bundle> {
        match kind {
            LabelKind::Word => &mut self.words,
            LabelKind::Phone => &mut self.phones,
        }
    }

    fn store(&mut self, bundle: Bundle) {
        match self.slot(bundle.kind) {
            Some(existing) => existing.merge(bundle),
            slot @ None => *slot = Some(bundle),
        }
    }

    /// Removes and returns the utterances present on both sides.
    fn take_joined(&mut self) -> Vec<JoinedUtterance> {
        let (Some(words), Some(phones)) = (self.words.as_mut(), self.phones.as_mut()) else {
            return Vec::new();
        };
        let shared: Vec<String> = words
            .utterances
            .keys()
            .filter(|id| phones.utterances.contains_key(*id))
            .cloned()
            .collect();

        let mut joined = Vec::with_capacity(shared.len());
        for id in shared {
            let word_labels = words.utterances.remove(&id).unwrap_or_default();
            let phone_labels = phones.utterances.remove(&id).unwrap_or_default();
            joined.push(JoinedUtterance {
                id,
                words: word_labels,
                phones: phone_labels,
            });
        }
        if words.is_empty() {
            self.words = None;
        }
        if self.phones.as_ref().is_some_and(Bundle::is_empty) {
            self.phones = None;
        }
        joined
    }

    fn leftover_utterances(&self) -> usize {
        [&self.words, &self.phones]
            .into_iter()
            .flatten()
            .map(|bundle| bundle.utterances.len())
            .sum()
    }

    /// The stream that delivered data for a never-paired recording.
    fn present_kind(&self) -> Option<LabelKind> {
        match (&self.words, &self.phones) {
            (Some(_), None) => Some(LabelKind::Word),
            (None, Some(_)) => Some(LabelKind::Phone),
            _ => None,
        }
    }
}

/// Counters of a combine worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CombineStats {
    pub bundles: usize,
    pub fragments: usize,
}

/// Station that pairs word and phone bundles per recording.
///
/// Utterances seen on only one side wait for a later delivery. Once input is
/// exhausted, recordings that never paired are reported as join integrity
/// gaps and nothing is emitted for them.
pub struct CombineStation {
    job: usize,
    corpus: Arc<Corpus>,
    cleanup: Option<CleanupRules>,
    pending: BTreeMap<String, PendingRecording>,
    stats: CombineStats,
}

impl CombineStation {
    pub fn new(job: usize, corpus: Arc<Corpus>) -> Self {
        Self {
            job,
            corpus,
            cleanup: None,
            pending: BTreeMap::new(),
            stats: CombineStats::default(),
        }
    }

    /// Enables the cleanup pass on every fragment.
    pub fn with_cleanup(mut self, rules: CleanupRules) -> Self {
        self.cleanup = Some(rules);
        self
    }

    pub fn stats(&self) -> CombineStats {
        self.stats
    }

    pub fn job(&self) -> usize {
        self.job
    }
}

impl Station for CombineStation {
    type Input = Bundle;
    type Output = TierSet;

    fn process(&mut self, bundle: Bundle) -> Result<Option<TierSet>, StationError> {
        self.stats.bundles += 1;
        let recording = bundle.recording.clone();
        let pending = self.pending.entry(recording.clone()).or_default();
        pending.store(bundle);

        let joined = pending.take_joined();
        if joined.is_empty() {
            return Ok(None);
        }
        pending.paired = true;

        let count = joined.len();
        let tiers = build_tier_set(&self.corpus, &recording, joined, self.cleanup.as_ref())
            .map_err(|message| {
                StationError::Recoverable(ErrorRecord::new(
                    ErrorKey::recording(&recording),
                    Fault::JoinIntegrityGap(message),
                ))
            })?;

        tracing::debug!(
            job = self.job,
            recording = %recording,
            utterances = count,
            speakers = tiers.speaker_count(),
            "fragment joined"
        );
        self.stats.fragments += 1;
        Ok(Some(tiers))
    }

    fn name(&self) -> &'static str {
        "Combine"
    }

    fn undelivered(&self, tiers: &TierSet) -> Option<ErrorRecord> {
        Some(ErrorRecord::new(
            ErrorKey::recording(&tiers.recording),
            Fault::JoinIntegrityGap(format!(
                "tiers of {} speaker(s) from job {} never reached the aggregator",
                tiers.speaker_count(),
                self.job
            )),
        ))
    }

    fn drain(&mut self) -> Vec<Result<TierSet, StationError>> {
        let mut gaps = Vec::new();
        for (recording, pending) in std::mem::take(&mut self.pending) {
            if pending.paired {
                let leftover = pending.leftover_utterances();
                if leftover > 0 {
                    tracing::debug!(
                        job = self.job,
                        recording = %recording,
                        leftover,
                        "skipping utterances aligned on one stream only"
                    );
                }
                continue;
            }
            let detail = match pending.present_kind() {
                Some(kind) => format!(
                    "job {} received {} labels but no {} labels",
                    self.job,
                    kind,
                    kind.opposite()
                ),
                None => format!("job {} never joined any utterance", self.job),
            };
            gaps.push(Err(StationError::Recoverable(ErrorRecord::new(
                ErrorKey::recording(recording),
                Fault::JoinIntegrityGap(detail),
            ))));
        }
        gaps
    }
}
