//! Export pipeline: groupers → combine workers → aggregator → writer pool.
//!
//! Every job gets a word grouper, a phone grouper and a combine worker joined
//! by a job-local channel. All combine workers feed one aggregator, which
//! feeds a pool of writers. A stage's finished signal is set only after the
//! orchestrator has joined every worker of the stage before it.

use crate::backend::scan_log;
use crate::config::Config;
use crate::corpus::Corpus;
use crate::defaults::FILE_POLL_INTERVAL_MS;
use crate::error::{Result, TiergridError};
use crate::export::{ExportSink, WrittenRecording, write_error_report};
use crate::job::JobSpec;
use crate::pipeline::aggregator_station::AggregatorStation;
use crate::pipeline::combine_station::CombineStation;
use crate::pipeline::error::{ErrorKey, ErrorRecord, ErrorTable, Fault, Stage};
use crate::pipeline::grouper_worker::{GrouperSettings, GrouperStats, GrouperWorker};
use crate::pipeline::signal::Signal;
use crate::pipeline::station::{StationContext, StationRunner};
use crate::pipeline::types::{Bundle, LabelKind};
use crate::pipeline::writer_station::WriterStation;
use crate::tiers::{CleanupRules, TierSet};
use crossbeam_channel::{Sender, bounded};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Counters of a successful run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportSummary {
    pub jobs: usize,
    pub records: usize,
    pub bundles: usize,
    pub fragments: usize,
    pub recordings_written: usize,
    /// Recordings exported without every speaker present.
    pub incomplete_recordings: usize,
    pub intervals_written: usize,
    pub written: Vec<WrittenRecording>,
    pub elapsed: Duration,
}

impl fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} recording(s) written ({} intervals) from {} job(s) in {:.2}s",
            self.recordings_written,
            self.intervals_written,
            self.jobs,
            self.elapsed.as_secs_f64()
        )
    }
}

struct JobWorkers {
    id: usize,
    log_path: Option<PathBuf>,
    groupers: Vec<(LabelKind, JoinHandle<GrouperStats>)>,
    combiner: StationRunner<CombineStation>,
    grouped: Signal,
}

/// Runs one export over a set of jobs.
pub struct ExportPipeline {
    config: Config,
    corpus: Arc<Corpus>,
    sink: Arc<dyn ExportSink>,
    stop: Signal,
    report_dir: Option<PathBuf>,
}

impl ExportPipeline {
    pub fn new(config: Config, corpus: Arc<Corpus>, sink: Arc<dyn ExportSink>) -> Self {
        Self {
            config,
            corpus,
            sink,
            stop: Signal::new(),
            report_dir: None,
        }
    }

    /// Shares an externally owned stop flag.
    pub fn with_stop_signal(mut self, stop: Signal) -> Self {
        self.stop = stop;
        self
    }

    /// Directory the error report is written to when the run fails.
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    /// Handle that halts acceptance of new work when set.
    pub fn stop_signal(&self) -> Signal {
        self.stop.clone()
    }

    /// Runs every job to completion.
    ///
    /// Fails with [`TiergridError::ExportFailed`] listing every recorded error
    /// when any unit of work failed, even if other recordings were written.
    pub fn run(&self, jobs: Vec<JobSpec>) -> Result<ExportSummary> {
        self.config.validate()?;
        let started = Instant::now();
        let mut seen = HashSet::new();
        if let Some(job) = jobs.iter().find(|job| !seen.insert(job.id)) {
            return Err(TiergridError::Other(format!("duplicate job id {}", job.id)));
        }

        let errors = ErrorTable::new();
        let settings = &self.config.pipeline;
        let job_count = jobs.len();
        tracing::info!(
            jobs = job_count,
            writers = settings.writer_count,
            recordings = self.corpus.len(),
            "starting export"
        );

        let combining_finished = Signal::new();
        let aggregation_finished = Signal::new();
        let (export_tx, export_rx) = bounded(settings.export_channel_capacity);
        let (write_tx, write_rx) = bounded(settings.write_channel_capacity);

        let mut writers = Vec::with_capacity(settings.writer_count);
        for index in 0..settings.writer_count {
            let station = WriterStation::new(index, Arc::clone(&self.sink));
            let runner = StationRunner::spawn_terminal(
                station,
                format!("writer-{}", index),
                write_rx.clone(),
                self.context(&aggregation_finished, &errors),
            );
            writers.push(self.started(runner)?);
        }
        drop(write_rx);

        let aggregator = self.started(StationRunner::spawn(
            AggregatorStation::new(Arc::clone(&self.corpus), self.config.export.incomplete),
            "aggregator",
            export_rx,
            write_tx,
            self.context(&combining_finished, &errors),
        ))?;

        let mut job_workers = Vec::with_capacity(job_count);
        for job in jobs {
            job_workers.push(self.spawn_job(job, &export_tx, &errors)?);
        }
        drop(export_tx);

        // Join stage by stage, releasing each downstream stage in turn.
        let mut panicked = Vec::new();
        let mut summary = ExportSummary {
            jobs: job_count,
            ..ExportSummary::default()
        };
        let mut combiners = Vec::with_capacity(job_workers.len());
        for workers in job_workers {
            for (kind, handle) in workers.groupers {
                match handle.join() {
                    Ok(stats) => summary.records += stats.records,
                    Err(_) => panicked.push(format!("{}-grouper-{}", kind, workers.id)),
                }
            }
            if let Some(log) = &workers.log_path {
                scan_job_log(workers.id, log, &errors);
            }
            workers.grouped.set();
            combiners.push(workers.combiner);
        }

        for combiner in combiners {
            let name = combiner.name().to_string();
            match combiner.join() {
                Ok(station) => {
                    summary.bundles += station.stats().bundles;
                    summary.fragments += station.stats().fragments;
                }
                Err(_) => panicked.push(name),
            }
        }
        combining_finished.set();

        match aggregator.join() {
            Ok(station) => summary.incomplete_recordings = station.stats().incomplete,
            Err(_) => panicked.push("aggregator".to_string()),
        }
        aggregation_finished.set();

        for writer in writers {
            let name = writer.name().to_string();
            match writer.join() {
                Ok(station) => summary.written.extend(station.into_written()),
                Err(_) => panicked.push(name),
            }
        }

        summary.recordings_written = summary.written.len();
        summary.intervals_written = summary.written.iter().map(|w| w.intervals).sum();
        summary.elapsed = started.elapsed();

        if !panicked.is_empty() {
            return Err(TiergridError::WorkerPanicked {
                worker: panicked.join(", "),
            });
        }

        let report = errors.report();
        if !report.is_empty() {
            if let Some(dir) = &self.report_dir {
                match write_error_report(dir, &report) {
                    Ok(path) => tracing::info!(path = %path.display(), "error report written"),
                    Err(e) => tracing::error!("failed to write error report: {}", e),
                }
            }
            tracing::error!(keys = report.len(), "export finished with errors");
            return Err(TiergridError::ExportFailed(report));
        }
        if self.stop.is_set() {
            return Err(TiergridError::Stopped);
        }

        tracing::info!(
            recordings = summary.recordings_written,
            intervals = summary.intervals_written,
            "export finished"
        );
        Ok(summary)
    }

    fn spawn_job(
        &self,
        job: JobSpec,
        export_tx: &Sender<TierSet>,
        errors: &ErrorTable,
    ) -> Result<JobWorkers> {
        let grouped = Signal::new();
        let (bundle_tx, bundle_rx) = bounded::<Bundle>(self.config.pipeline.job_channel_capacity);

        let mut station = CombineStation::new(job.id, Arc::clone(&self.corpus));
        if self.config.export.cleanup {
            station = station.with_cleanup(CleanupRules::new(
                &self.config.labels.silence_words,
                &self.config.labels.silence_phones,
            ));
        }
        let combiner = self.started(StationRunner::spawn(
            station,
            format!("combine-{}", job.id),
            bundle_rx,
            export_tx.clone(),
            self.context(&grouped, errors),
        ))?;

        let grouper_settings = GrouperSettings {
            positions: self.config.labels.positions.clone(),
            use_transcript: self.config.export.cleanup,
            file_wait_timeout: self.config.pipeline.file_wait_timeout(),
            file_poll_interval: Duration::from_millis(FILE_POLL_INTERVAL_MS),
        };
        let mut groupers = Vec::with_capacity(2);
        for kind in [LabelKind::Word, LabelKind::Phone] {
            let worker = GrouperWorker::new(
                job.clone(),
                kind,
                Arc::clone(&self.corpus),
                grouper_settings.clone(),
                self.stop.clone(),
                errors.clone(),
            );
            groupers.push((kind, self.started(worker.spawn(bundle_tx.clone()))?));
        }

        Ok(JobWorkers {
            id: job.id,
            log_path: job.log_path,
            groupers,
            combiner,
            grouped,
        })
    }

    fn context(&self, upstream: &Signal, errors: &ErrorTable) -> StationContext {
        StationContext {
            stop: self.stop.clone(),
            upstream_finished: upstream.clone(),
            poll_timeout: self.config.pipeline.poll_timeout(),
            error_reporter: Arc::new(errors.clone()),
        }
    }

    /// Stops the run when a worker thread could not be started.
    ///
    /// Workers already running see the stop flag or their inputs disconnect
    /// and exit on their own.
    fn started<T>(&self, spawned: Result<T>) -> Result<T> {
        spawned.inspect_err(|e| {
            tracing::error!("failed to start worker: {}", e);
            self.stop.set();
        })
    }
}

fn scan_job_log(job: usize, log: &Path, errors: &ErrorTable) {
    let key = ErrorKey::stage(Stage::Backend, job);
    match scan_log(log) {
        Ok(hits) => {
            for line in hits {
                errors.record(ErrorRecord::new(key.clone(), Fault::Backend(line)));
            }
        }
        Err(e) => errors.record(ErrorRecord::new(
            key,
            Fault::Backend(format!("cannot read log {}: {}", log.display(), e)),
        )),
    }
}
