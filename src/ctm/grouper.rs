//! Groups a sequential label stream into per-recording bundles.
//!
//! Records of one utterance arrive contiguously. When the utterance changes the
//! held one is mapped to symbols, shifted into recording time and stored under
//! the active recording; when the recording changes the accumulated bundle is
//! emitted.

use crate::corpus::{Corpus, Utterance};
use crate::ctm::line::{Interval, LineError, parse_line};
use crate::ctm::mapping::{LabelMapper, Lexicon, MappingError};
use crate::pipeline::types::{Bundle, LabelKind};
use std::sync::Arc;
use thiserror::Error;

/// A record or utterance the grouper had to skip.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GroupError {
    #[error("line {line}: {source}")]
    Line {
        line: usize,
        #[source]
        source: LineError,
    },

    #[error("utterance {0} is not registered")]
    UnknownUtterance(String),

    #[error("utterance {utterance}: {source}")]
    Mapping {
        utterance: String,
        #[source]
        source: MappingError,
    },
}

/// Bundles and skipped records produced from a block of text.
#[derive(Debug, Default)]
pub struct GroupOutput {
    pub bundles: Vec<Bundle>,
    pub errors: Vec<GroupError>,
}

struct HeldUtterance {
    id: String,
    recording: String,
    offset: f64,
    transcript: Option<String>,
    intervals: Vec<Interval>,
}

impl HeldUtterance {
    fn start(info: &Utterance, first: Interval) -> Self {
        Self {
            id: info.id.clone(),
            recording: info.recording.clone(),
            offset: info.begin,
            transcript: info.text.clone(),
            intervals: vec![first],
        }
    }
}

/// Stateful grouper over one label stream of one job.
pub struct StreamGrouper {
    job: usize,
    corpus: Arc<Corpus>,
    lexicon: Arc<Lexicon>,
    mapper: LabelMapper,
    held: Option<HeldUtterance>,
    accumulator: Option<Bundle>,
    errors: Vec<GroupError>,
}

impl StreamGrouper {
    pub fn new(job: usize, corpus: Arc<Corpus>, lexicon: Arc<Lexicon>, mapper: LabelMapper) -> Self {
        Self {
            job,
            corpus,
            lexicon,
            mapper,
            held: None,
            accumulator: None,
            errors: Vec::new(),
        }
    }

    pub fn kind(&self) -> LabelKind {
        self.mapper.kind()
    }

    /// Parses and pushes one raw line; blank lines are ignored.
    pub fn feed_line(&mut self, line: &str, line_no: usize) -> Result<Option<Bundle>, GroupError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let interval = parse_line(line).map_err(|source| GroupError::Line {
            line: line_no,
            source,
        })?;
        self.push(interval)
    }

    /// Pushes one parsed interval.
    ///
    /// Returns the completed bundle of the previous recording when this
    /// interval starts a new one. A record for an unregistered utterance is
    /// rejected without disturbing the held state.
    pub fn push(&mut self, interval: Interval) -> Result<Option<Bundle>, GroupError> {
        if let Some(held) = self.held.as_mut()
            && held.id == interval.utterance
        {
            held.intervals.push(interval);
            return Ok(None);
        }

        let corpus = Arc::clone(&self.corpus);
        let info = corpus
            .utterance(&interval.utterance)
            .ok_or_else(|| GroupError::UnknownUtterance(interval.utterance.clone()))?;

        if let Some(held) = self.held.take() {
            self.finalize(held);
        }

        let mut flushed = None;
        if self
            .accumulator
            .as_ref()
            .is_some_and(|bundle| bundle.recording != info.recording)
        {
            flushed = self.accumulator.take().filter(|bundle| !bundle.is_empty());
        }
        if self.accumulator.is_none() {
            self.accumulator = Some(Bundle::new(self.kind(), self.job, &info.recording));
        }

        self.held = Some(HeldUtterance::start(info, interval));
        Ok(flushed)
    }

    /// Finalizes the held utterance and returns the last bundle, if any.
    pub fn finish(&mut self) -> Option<Bundle> {
        if let Some(held) = self.held.take() {
            self.finalize(held);
        }
        self.accumulator.take().filter(|bundle| !bundle.is_empty())
    }

    /// Mapping failures collected since the last call.
    pub fn take_errors(&mut self) -> Vec<GroupError> {
        std::mem::take(&mut self.errors)
    }

    /// Groups a whole block of records, including the final flush.
    pub fn group_str(&mut self, text: &str) -> GroupOutput {
        let mut output = GroupOutput::default();
        for (index, line) in text.lines().enumerate() {
            match self.feed_line(line, index + 1) {
                Ok(Some(bundle)) => output.bundles.push(bundle),
                Ok(None) => {}
                Err(e) => output.errors.push(e),
            }
        }
        output.bundles.extend(self.finish());
        output.errors.extend(self.take_errors());
        output
    }

    fn finalize(&mut self, held: HeldUtterance) {
        let mapped = self
            .mapper
            .map(held.intervals, held.transcript.as_deref(), &self.lexicon);
        let mut labels = match mapped {
            Ok(labels) => labels,
            Err(source) => {
                self.errors.push(GroupError::Mapping {
                    utterance: held.id,
                    source,
                });
                return;
            }
        };

        if held.offset != 0.0 {
            for interval in &mut labels {
                interval.shift(held.offset);
            }
        }

        let bundle = self
            .accumulator
            .get_or_insert_with(|| Bundle::new(self.mapper.kind(), self.job, &held.recording));
        bundle.utterances.entry(held.id).or_default().extend(labels);
    }
}
