//! tiergrid - Tiered annotation export for forced alignments
//!
//! Merges word and phone label streams into one annotation file per
//! recording, using a threaded grouper → combine → aggregate → write pipeline.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod backend;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod corpus;
pub mod ctm;
pub mod defaults;
pub mod error;
pub mod export;
pub mod job;
pub mod manifest;
pub mod pipeline;
pub mod tiers;

// Core traits (source → process → sink)
pub use export::{CollectorSink, ExportSink, FileExportSink};

// Pipeline
pub use pipeline::orchestrator::{ExportPipeline, ExportSummary};

// Error handling
pub use error::{Result, TiergridError};
pub use pipeline::error::{ErrorKey, ErrorReport, ErrorTable, Fault};

// Config and inputs
pub use config::{Config, IncompletePolicy, OutputFormat};
pub use corpus::{Corpus, Recording, Utterance};
pub use job::{JobSpec, Partition};
pub use manifest::Manifest;

// Station framework (for advanced users)
pub use pipeline::error::{ErrorReporter, StationError};
pub use pipeline::station::Station;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
