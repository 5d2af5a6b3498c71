//! Annotation export: document model, serializers and sinks.

pub mod document;
pub mod file_sink;
pub mod textgrid;

pub use document::{Annotation, Tier, TierInterval, build_annotation};
pub use file_sink::FileExportSink;

use crate::defaults::ERROR_REPORT_FILENAME;
use crate::error::{Result, TiergridError};
use crate::pipeline::error::ErrorReport;
use crate::pipeline::types::RecordingExport;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Outcome of one successful write.
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenRecording {
    pub recording: String,
    /// File written, for sinks that write files.
    pub path: Option<PathBuf>,
    /// Where the previous output was moved, if it existed.
    pub backup: Option<PathBuf>,
    pub intervals: usize,
    pub complete: bool,
}

impl WrittenRecording {
    pub fn from_export(export: &RecordingExport) -> Self {
        Self {
            recording: export.recording().to_string(),
            path: None,
            backup: None,
            intervals: export.tiers.interval_count(),
            complete: export.complete,
        }
    }
}

/// Destination of finished recordings.
///
/// Shared by every writer thread; each call handles one recording and output
/// locations are disjoint per recording.
pub trait ExportSink: Send + Sync {
    fn write(&self, export: &RecordingExport) -> Result<WrittenRecording>;

    /// Name for logging.
    fn name(&self) -> &'static str {
        "export"
    }
}

/// Sink that keeps every export in memory.
#[derive(Debug, Default)]
pub struct CollectorSink {
    exports: Mutex<Vec<RecordingExport>>,
    fail_on: HashSet<String>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes writes of `recording` fail.
    pub fn failing_on(mut self, recording: impl Into<String>) -> Self {
        self.fail_on.insert(recording.into());
        self
    }

    /// Every export received so far, in arrival order.
    pub fn exports(&self) -> Vec<RecordingExport> {
        self.lock().clone()
    }

    /// Number of writes per recording.
    pub fn write_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for export in self.lock().iter() {
            *counts.entry(export.recording().to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RecordingExport>> {
        self.exports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ExportSink for CollectorSink {
    fn write(&self, export: &RecordingExport) -> Result<WrittenRecording> {
        if self.fail_on.contains(export.recording()) {
            return Err(TiergridError::ExportWrite {
                path: export.recording().to_string(),
                message: "rejected by collector".to_string(),
            });
        }
        self.lock().push(export.clone());
        Ok(WrittenRecording::from_export(export))
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Writes the error report artifact into `dir`.
pub fn write_error_report(dir: &Path, report: &ErrorReport) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(ERROR_REPORT_FILENAME);
    fs::write(&path, report.to_string())?;
    Ok(path)
}
