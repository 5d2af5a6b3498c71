//! Source workers: one per job and label stream.
//!
//! Waits for each partition's label file, groups its records into bundles and
//! sends them to the job's combine worker. Skipped records go to the error
//! table; the job itself never aborts on them.

use crate::backend::wait_for_file;
use crate::corpus::Corpus;
use crate::ctm::grouper::StreamGrouper;
use crate::ctm::mapping::LabelMapper;
use crate::error::Result;
use crate::job::{JobSpec, Partition};
use crate::pipeline::error::{ErrorKey, ErrorRecord, ErrorTable, Fault, Stage};
use crate::pipeline::signal::Signal;
use crate::pipeline::types::{Bundle, LabelKind};
use crossbeam_channel::Sender;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Label handling and backend polling settings of a grouper.
#[derive(Debug, Clone)]
pub struct GrouperSettings {
    pub positions: Vec<String>,
    pub use_transcript: bool,
    pub file_wait_timeout: Duration,
    pub file_poll_interval: Duration,
}

/// Counters reported by a finished grouper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrouperStats {
    pub records: usize,
    pub bundles: usize,
    pub skipped: usize,
}

/// Reads one label stream of one job.
pub struct GrouperWorker {
    job: JobSpec,
    kind: LabelKind,
    corpus: Arc<Corpus>,
    settings: GrouperSettings,
    stop: Signal,
    errors: ErrorTable,
    stats: GrouperStats,
}

enum Flow {
    Continue,
    /// Downstream is gone or a stop was requested.
    Halt,
}

impl GrouperWorker {
    pub fn new(
        job: JobSpec,
        kind: LabelKind,
        corpus: Arc<Corpus>,
        settings: GrouperSettings,
        stop: Signal,
        errors: ErrorTable,
    ) -> Self {
        Self {
            job,
            kind,
            corpus,
            settings,
            stop,
            errors,
            stats: GrouperStats::default(),
        }
    }

    /// Runs the worker on its own named thread.
    pub fn spawn(self, output_tx: Sender<Bundle>) -> Result<JoinHandle<GrouperStats>> {
        let name = format!("{}-grouper-{}", self.kind, self.job.id);
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || self.run(&output_tx))?;
        Ok(handle)
    }

    /// Processes every partition in order and returns the counters.
    pub fn run(mut self, output_tx: &Sender<Bundle>) -> GrouperStats {
        let partitions = std::mem::take(&mut self.job.partitions);
        for partition in &partitions {
            if self.stop.is_set() {
                tracing::debug!(job = self.job.id, kind = %self.kind, "stop requested");
                break;
            }
            if let Flow::Halt = self.process_partition(partition, output_tx) {
                break;
            }
        }
        tracing::debug!(
            job = self.job.id,
            kind = %self.kind,
            records = self.stats.records,
            bundles = self.stats.bundles,
            skipped = self.stats.skipped,
            "grouper finished"
        );
        self.stats
    }

    fn process_partition(&mut self, partition: &Partition, output_tx: &Sender<Bundle>) -> Flow {
        let path = partition.path(self.kind);
        if !wait_for_file(
            path,
            self.settings.file_wait_timeout,
            self.settings.file_poll_interval,
            &self.stop,
        ) {
            if !self.stop.is_set() {
                self.backend_fault(format!("label file {} was never produced", path.display()));
            }
            return Flow::Continue;
        }
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                self.backend_fault(format!("cannot open {}: {}", path.display(), e));
                return Flow::Continue;
            }
        };
        tracing::debug!(
            job = self.job.id,
            kind = %self.kind,
            partition = %partition.name,
            path = %path.display(),
            "reading labels"
        );

        let mapper = LabelMapper::new(self.kind)
            .with_positions(self.settings.positions.clone())
            .with_transcript_cleanup(self.settings.use_transcript);
        let mut grouper = StreamGrouper::new(
            self.job.id,
            Arc::clone(&self.corpus),
            Arc::clone(&partition.lexicon),
            mapper,
        );

        let mut flow = Flow::Continue;
        for (index, line) in BufReader::new(file).lines().enumerate() {
            // A unit in progress completes; no new records once stopped.
            if self.stop.is_set() {
                flow = Flow::Halt;
                break;
            }
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    self.backend_fault(format!("read error in {}: {}", path.display(), e));
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            self.stats.records += 1;
            match grouper.feed_line(&line, index + 1) {
                Ok(Some(bundle)) => {
                    if !self.send(bundle, output_tx) {
                        return Flow::Halt;
                    }
                }
                Ok(None) => {}
                Err(e) => self.parse_fault(path.display(), e),
            }
            for e in grouper.take_errors() {
                self.parse_fault(path.display(), e);
            }
        }

        if let Some(bundle) = grouper.finish()
            && !self.send(bundle, output_tx)
        {
            flow = Flow::Halt;
        }
        for e in grouper.take_errors() {
            self.parse_fault(path.display(), e);
        }
        flow
    }

    fn send(&mut self, bundle: Bundle, output_tx: &Sender<Bundle>) -> bool {
        tracing::trace!(
            job = self.job.id,
            kind = %self.kind,
            recording = %bundle.recording,
            utterances = bundle.utterances.len(),
            "bundle ready"
        );
        if output_tx.send(bundle).is_err() {
            tracing::debug!(job = self.job.id, kind = %self.kind, "combine worker gone");
            return false;
        }
        self.stats.bundles += 1;
        true
    }

    fn parse_fault(&mut self, source: impl std::fmt::Display, error: impl std::fmt::Display) {
        self.stats.skipped += 1;
        self.errors.record(ErrorRecord::new(
            ErrorKey::stage(Stage::from(self.kind), self.job.id),
            Fault::Parse(format!("{}: {}", source, error)),
        ));
    }

    fn backend_fault(&self, message: String) {
        self.errors.record(ErrorRecord::new(
            ErrorKey::stage(Stage::Backend, self.job.id),
            Fault::Backend(message),
        ));
    }
}
