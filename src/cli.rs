//! Command-line interface for tiergrid
//!
//! Provides argument parsing using clap derive macros.

use crate::config::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Merge word and phone alignments into per-recording tier files
#[derive(Parser, Debug)]
#[command(
    name = "tiergrid",
    version,
    about = "Merge word and phone alignments into per-recording tier files"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (default: ./tiergrid.toml if present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: per-stage progress, -vv: every bundle and write)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse an output format name.
fn parse_format(s: &str) -> Result<OutputFormat, String> {
    OutputFormat::parse(s.trim()).ok_or_else(|| format!("unknown format '{s}' (expected textgrid or json)"))
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export every recording of a run manifest
    Export {
        /// Run manifest describing recordings, lexicons and jobs
        #[arg(long, short = 'm', value_name = "PATH")]
        manifest: PathBuf,

        /// Directory annotations are written to
        #[arg(long, short = 'o', value_name = "DIR")]
        output: PathBuf,

        /// Where previous outputs are moved when overwrite is off (default: <output>/.backup)
        #[arg(long, value_name = "DIR")]
        backup: Option<PathBuf>,

        /// Output format override (textgrid, json)
        #[arg(long, value_name = "FORMAT", value_parser = parse_format)]
        format: Option<OutputFormat>,

        /// Replace existing outputs instead of backing them up
        #[arg(long)]
        overwrite: bool,

        /// Number of writer threads override
        #[arg(long, value_name = "N")]
        writers: Option<usize>,
    },

    /// Validate a run manifest without exporting
    Check {
        /// Run manifest to validate
        #[arg(long, short = 'm', value_name = "PATH")]
        manifest: PathBuf,
    },

    /// Print the effective configuration as TOML
    Config,
}
