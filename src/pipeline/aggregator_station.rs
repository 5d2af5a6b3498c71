//! Accumulates tier fragments until a recording covers every speaker.

use crate::config::IncompletePolicy;
use crate::corpus::Corpus;
use crate::pipeline::error::{ErrorKey, ErrorRecord, Fault, StationError};
use crate::pipeline::station::Station;
use crate::pipeline::types::RecordingExport;
use crate::tiers::TierSet;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Counters of the aggregator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub fragments: usize,
    pub forwarded: usize,
    pub incomplete: usize,
}

/// Station that forwards each recording exactly once, when its speaker set
/// is complete.
///
/// Fragments from different jobs may carry different speakers of the same
/// recording; they are merged until the buffered speaker count reaches the
/// recording's speaker ordering. Recordings still buffered at drain are
/// handled by the configured [`IncompletePolicy`].
pub struct AggregatorStation {
    corpus: Arc<Corpus>,
    policy: IncompletePolicy,
    buffered: BTreeMap<String, TierSet>,
    exported: HashSet<String>,
    stats: AggregatorStats,
}

impl AggregatorStation {
    pub fn new(corpus: Arc<Corpus>, policy: IncompletePolicy) -> Self {
        Self {
            corpus,
            policy,
            buffered: BTreeMap::new(),
            exported: HashSet::new(),
            stats: AggregatorStats::default(),
        }
    }

    pub fn stats(&self) -> AggregatorStats {
        self.stats
    }

    fn gap(recording: &str, detail: String) -> StationError {
        StationError::Recoverable(ErrorRecord::new(
            ErrorKey::recording(recording),
            Fault::JoinIntegrityGap(detail),
        ))
    }
}

impl Station for AggregatorStation {
    type Input = TierSet;
    type Output = RecordingExport;

    fn process(&mut self, fragment: TierSet) -> Result<Option<RecordingExport>, StationError> {
        self.stats.fragments += 1;
        let recording = fragment.recording.clone();

        let Some(expected) = self.corpus.speaker_count(&recording) else {
            return Err(Self::gap(
                &recording,
                "fragment for a recording that is not registered".to_string(),
            ));
        };
        if self.exported.contains(&recording) {
            return Err(Self::gap(
                &recording,
                format!(
                    "fragment with {} speaker(s) arrived after the recording was exported",
                    fragment.speaker_count()
                ),
            ));
        }

        let buffer = self
            .buffered
            .entry(recording.clone())
            .or_insert_with(|| TierSet::new(&recording));
        buffer.merge(fragment);
        let have = buffer.speaker_count();
        if have < expected {
            tracing::debug!(recording = %recording, have, expected, "waiting for speakers");
            return Ok(None);
        }

        let Some(tiers) = self.buffered.remove(&recording) else {
            return Ok(None);
        };
        self.exported.insert(recording);
        self.stats.forwarded += 1;
        Ok(Some(RecordingExport::complete(tiers)))
    }

    fn name(&self) -> &'static str {
        "Aggregator"
    }

    fn undelivered(&self, export: &RecordingExport) -> Option<ErrorRecord> {
        Some(ErrorRecord::new(
            ErrorKey::recording(export.recording()),
            Fault::ExportWrite("no writer accepted the recording".to_string()),
        ))
    }

    fn drain(&mut self) -> Vec<Result<RecordingExport, StationError>> {
        let mut drained = Vec::new();
        for (recording, tiers) in std::mem::take(&mut self.buffered) {
            self.stats.incomplete += 1;
            let expected = self.corpus.speaker_count(&recording).unwrap_or_default();
            let detail = format!(
                "only {} of {} speaker(s) received",
                tiers.speaker_count(),
                expected
            );
            match self.policy {
                IncompletePolicy::Flag => {
                    self.exported.insert(recording.clone());
                    self.stats.forwarded += 1;
                    drained.push(Ok(RecordingExport::partial(tiers)));
                    drained.push(Err(Self::gap(&recording, format!("{}; exported as-is", detail))));
                }
                IncompletePolicy::Export => {
                    tracing::warn!(recording = %recording, "{}; exporting as-is", detail);
                    self.exported.insert(recording);
                    self.stats.forwarded += 1;
                    drained.push(Ok(RecordingExport::partial(tiers)));
                }
                IncompletePolicy::Drop => {
                    drained.push(Err(Self::gap(&recording, format!("{}; not exported", detail))));
                }
            }
        }
        drained
    }
}
