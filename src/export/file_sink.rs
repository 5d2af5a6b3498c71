//! Writes annotations to per-recording files under an output directory.

use crate::config::{ExportSettings, OutputFormat};
use crate::corpus::{Corpus, Recording};
use crate::defaults::normalize_frame_shift;
use crate::error::{Result, TiergridError};
use crate::export::document::build_annotation;
use crate::export::textgrid;
use crate::export::{ExportSink, WrittenRecording};
use crate::pipeline::types::RecordingExport;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directory of previous outputs, relative to the output directory, when no
/// backup directory is given.
const DEFAULT_BACKUP_DIR: &str = ".backup";

/// File-backed export sink.
///
/// With `overwrite` off, an existing file is moved to the same relative
/// location under the backup directory before the new one is written.
#[derive(Debug, Clone)]
pub struct FileExportSink {
    corpus: Arc<Corpus>,
    output_dir: PathBuf,
    backup_dir: PathBuf,
    format: OutputFormat,
    overwrite: bool,
    frame_shift: f64,
}

impl FileExportSink {
    pub fn new(corpus: Arc<Corpus>, output_dir: impl Into<PathBuf>, settings: &ExportSettings) -> Self {
        let output_dir = output_dir.into();
        Self {
            corpus,
            backup_dir: output_dir.join(DEFAULT_BACKUP_DIR),
            output_dir,
            format: settings.format,
            overwrite: settings.overwrite,
            frame_shift: normalize_frame_shift(settings.frame_shift),
        }
    }

    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn render(&self, recording: &Recording, export: &RecordingExport) -> Result<(String, usize)> {
        let annotation = build_annotation(recording, &export.tiers, self.frame_shift);
        let intervals = annotation.interval_count();
        let text = match self.format {
            OutputFormat::TextGrid => textgrid::render(&annotation),
            OutputFormat::Json => serde_json::to_string_pretty(&annotation)?,
        };
        Ok((text, intervals))
    }

    /// Moves an existing output aside; returns its new location.
    fn back_up(&self, path: &Path, backup: &Path) -> Result<Option<PathBuf>> {
        if self.overwrite || !path.exists() {
            return Ok(None);
        }
        if let Some(parent) = backup.parent() {
            fs::create_dir_all(parent).map_err(|e| write_error(backup, e))?;
        }
        if fs::rename(path, backup).is_err() {
            // Backup directory on another filesystem.
            fs::copy(path, backup).map_err(|e| write_error(backup, e))?;
            fs::remove_file(path).map_err(|e| write_error(path, e))?;
        }
        tracing::debug!(from = %path.display(), to = %backup.display(), "previous output backed up");
        Ok(Some(backup.to_path_buf()))
    }
}

fn write_error(path: &Path, error: std::io::Error) -> TiergridError {
    TiergridError::ExportWrite {
        path: path.display().to_string(),
        message: error.to_string(),
    }
}

impl ExportSink for FileExportSink {
    fn write(&self, export: &RecordingExport) -> Result<WrittenRecording> {
        let recording = self
            .corpus
            .recording(export.recording())
            .ok_or_else(|| TiergridError::UnknownRecording {
                name: export.recording().to_string(),
            })?;
        let (text, intervals) = self.render(recording, export)?;
        let path = recording.output_path(&self.output_dir, self.format);
        let backup_path = recording.output_path(&self.backup_dir, self.format);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| write_error(parent, e))?;
        }
        let backup = self.back_up(&path, &backup_path)?;
        fs::write(&path, text).map_err(|e| write_error(&path, e))?;

        Ok(WrittenRecording {
            recording: export.recording().to_string(),
            path: Some(path),
            backup,
            intervals,
            complete: export.complete,
        })
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
