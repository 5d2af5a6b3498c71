//! Error types for tiergrid.

use crate::pipeline::error::ErrorReport;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TiergridError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Run manifest errors
    #[error("Invalid run manifest {path}: {message}")]
    Manifest { path: String, message: String },

    // Registry errors
    #[error("Unknown recording: {name}")]
    UnknownRecording { name: String },

    // Export errors
    #[error("Failed to write {path}: {message}")]
    ExportWrite { path: String, message: String },

    #[error("Failed to serialize annotation: {0}")]
    Serialize(#[from] serde_json::Error),

    // Pipeline errors
    #[error("Worker '{worker}' panicked")]
    WorkerPanicked { worker: String },

    #[error("Export run was stopped before completion")]
    Stopped,

    #[error("Export run failed with {n} error key(s):\n{0}", n = .0.len())]
    ExportFailed(ErrorReport),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TiergridError>;
