//! Fault records, station errors and the shared error table.

use crate::pipeline::types::LabelKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Pipeline stage a fault was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Word,
    Phone,
    Combine,
    Aggregate,
    Export,
    Backend,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Word => "word",
            Stage::Phone => "phone",
            Stage::Combine => "combine",
            Stage::Aggregate => "aggregate",
            Stage::Export => "export",
            Stage::Backend => "backend",
        };
        f.write_str(name)
    }
}

impl From<LabelKind> for Stage {
    fn from(kind: LabelKind) -> Self {
        match kind {
            LabelKind::Word => Stage::Word,
            LabelKind::Phone => Stage::Phone,
        }
    }
}

/// Key of an error table entry: a stage of one job, or a recording.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum ErrorKey {
    Stage { stage: Stage, job: usize },
    Recording(String),
}

impl ErrorKey {
    pub fn stage(stage: Stage, job: usize) -> Self {
        ErrorKey::Stage { stage, job }
    }

    pub fn recording(name: impl Into<String>) -> Self {
        ErrorKey::Recording(name.into())
    }
}

impl fmt::Display for ErrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKey::Stage { stage, job } => write!(f, "({}, {})", stage, job),
            ErrorKey::Recording(name) => f.write_str(name),
        }
    }
}

/// Fault taxonomy of a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Fault {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("join integrity gap: {0}")]
    JoinIntegrityGap(String),

    #[error("export write error: {0}")]
    ExportWrite(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// One fault attributed to a key.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub key: ErrorKey,
    pub fault: Fault,
}

impl ErrorRecord {
    pub fn new(key: ErrorKey, fault: Fault) -> Self {
        Self { key, fault }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.fault)
    }
}

/// Errors that can occur during station processing.
#[derive(Debug, Clone, PartialEq)]
pub enum StationError {
    /// The unit is skipped; the station keeps processing.
    Recoverable(ErrorRecord),
    /// The station stops after reporting.
    Fatal(ErrorRecord),
}

impl StationError {
    pub fn record(&self) -> &ErrorRecord {
        match self {
            StationError::Recoverable(record) | StationError::Fatal(record) => record,
        }
    }
}

impl fmt::Display for StationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationError::Recoverable(record) => write!(f, "Recoverable error: {}", record),
            StationError::Fatal(record) => write!(f, "Fatal error: {}", record),
        }
    }
}

impl std::error::Error for StationError {}

/// Trait for reporting station errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from a station.
    fn report(&self, station: &str, error: &StationError);
}

/// Reporter that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, station: &str, error: &StationError) {
        log_station_error(station, error);
    }
}

fn log_station_error(station: &str, error: &StationError) {
    let record = error.record();
    match error {
        StationError::Recoverable(_) => {
            tracing::warn!(station, key = %record.key, "{}", record.fault)
        }
        StationError::Fatal(_) => {
            tracing::error!(station, key = %record.key, "{}", record.fault)
        }
    }
}

/// Shared, append-only map from error key to faults.
///
/// Every worker holds a clone; the orchestrator reads it once all workers are
/// done.
#[derive(Debug, Clone, Default)]
pub struct ErrorTable {
    entries: Arc<Mutex<BTreeMap<ErrorKey, Vec<Fault>>>>,
}

impl ErrorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record and logs it.
    pub fn record(&self, record: ErrorRecord) {
        tracing::warn!(key = %record.key, "{}", record.fault);
        self.lock().entry(record.key).or_default().push(record.fault);
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Snapshot of the table in key order.
    pub fn report(&self) -> ErrorReport {
        let entries = self
            .lock()
            .iter()
            .map(|(key, faults)| ReportEntry {
                key: key.clone(),
                details: faults.iter().map(ToString::to_string).collect(),
            })
            .collect();
        ErrorReport { entries }
    }

    // A worker that panicked while holding the lock cannot leave a torn entry.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<ErrorKey, Vec<Fault>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ErrorReporter for ErrorTable {
    fn report(&self, station: &str, error: &StationError) {
        if matches!(error, StationError::Fatal(_)) {
            log_station_error(station, error);
        }
        self.record(error.record().clone());
    }
}

/// One key of the final report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub key: ErrorKey,
    pub details: Vec<String>,
}

/// Final key → details mapping of a failed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorReport {
    pub entries: Vec<ReportEntry>,
}

impl ErrorReport {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &ErrorKey) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|entry| &entry.key == key)
            .map(|entry| entry.details.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &ErrorKey> {
        self.entries.iter().map(|entry| &entry.key)
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}:", entry.key)?;
            for detail in &entry.details {
                writeln!(f, "  {}", detail)?;
            }
        }
        Ok(())
    }
}
