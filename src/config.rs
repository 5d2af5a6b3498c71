use crate::defaults;
use crate::error::{Result, TiergridError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineSettings,
    pub export: ExportSettings,
    pub labels: LabelSettings,
}

/// Worker counts, channel capacities and polling intervals
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    pub poll_timeout_ms: u64,
    pub job_channel_capacity: usize,
    pub export_channel_capacity: usize,
    pub write_channel_capacity: usize,
    pub writer_count: usize,
    pub file_wait_timeout_ms: u64,
}

/// Output format and policies of the export stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportSettings {
    /// Frame shift in seconds (values above 1 are milliseconds)
    pub frame_shift: f64,
    pub overwrite: bool,
    pub cleanup: bool,
    pub format: OutputFormat,
    pub incomplete: IncompletePolicy,
}

/// Label symbol handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LabelSettings {
    pub positions: Vec<String>,
    pub silence_words: Vec<String>,
    pub silence_phones: Vec<String>,
}

/// Annotation file format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    TextGrid,
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::TextGrid => "TextGrid",
            OutputFormat::Json => "json",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "textgrid" => Some(OutputFormat::TextGrid),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

/// What the aggregator does with recordings still missing speakers at shutdown
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IncompletePolicy {
    /// Export what arrived and record an integrity-gap error.
    #[default]
    Flag,
    /// Export what arrived; only log a warning.
    Export,
    /// Do not export; record an integrity-gap error.
    Drop,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            poll_timeout_ms: defaults::POLL_TIMEOUT_MS,
            job_channel_capacity: defaults::JOB_CHANNEL_CAPACITY,
            export_channel_capacity: defaults::EXPORT_CHANNEL_CAPACITY,
            write_channel_capacity: defaults::WRITE_CHANNEL_CAPACITY,
            writer_count: defaults::WRITER_COUNT,
            file_wait_timeout_ms: defaults::FILE_WAIT_TIMEOUT_MS,
        }
    }
}

impl PipelineSettings {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn file_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.file_wait_timeout_ms)
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            frame_shift: defaults::FRAME_SHIFT,
            overwrite: false,
            cleanup: true,
            format: OutputFormat::default(),
            incomplete: IncompletePolicy::default(),
        }
    }
}

impl Default for LabelSettings {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            positions: owned(defaults::POSITION_MARKERS),
            silence_words: owned(defaults::SILENCE_WORDS),
            silence_phones: owned(defaults::SILENCE_PHONES),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TiergridError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                TiergridError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(TiergridError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - TIERGRID_FORMAT → export.format (`textgrid` or `json`)
    /// - TIERGRID_OVERWRITE → export.overwrite (`true`/`false`/`1`/`0`)
    /// - TIERGRID_WRITERS → pipeline.writer_count
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(format) = std::env::var("TIERGRID_FORMAT")
            && let Some(format) = OutputFormat::parse(&format)
        {
            self.export.format = format;
        }

        if let Ok(overwrite) = std::env::var("TIERGRID_OVERWRITE") {
            match overwrite.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.export.overwrite = true,
                "0" | "false" | "no" => self.export.overwrite = false,
                _ => {}
            }
        }

        if let Ok(writers) = std::env::var("TIERGRID_WRITERS")
            && let Ok(writers) = writers.parse::<usize>()
            && writers > 0
        {
            self.pipeline.writer_count = writers;
        }

        self
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, message: &str| {
            Err(TiergridError::ConfigInvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            })
        };

        if self.export.frame_shift.is_nan() || self.export.frame_shift <= 0.0 {
            return invalid("export.frame_shift", "must be positive");
        }
        if self.pipeline.poll_timeout_ms == 0 {
            return invalid("pipeline.poll_timeout_ms", "must be at least 1");
        }
        if self.pipeline.writer_count == 0 {
            return invalid("pipeline.writer_count", "must be at least 1");
        }
        for (key, capacity) in [
            ("pipeline.job_channel_capacity", self.pipeline.job_channel_capacity),
            (
                "pipeline.export_channel_capacity",
                self.pipeline.export_channel_capacity,
            ),
            (
                "pipeline.write_channel_capacity",
                self.pipeline.write_channel_capacity,
            ),
        ] {
            if capacity == 0 {
                return invalid(key, "must be at least 1");
            }
        }
        Ok(())
    }
}
