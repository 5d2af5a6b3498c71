use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiergrid::cli::{Cli, Commands};
use tiergrid::config::{Config, OutputFormat};
use tiergrid::defaults::{CONFIG_FILENAME, ERROR_REPORT_FILENAME};
use tiergrid::export::FileExportSink;
use tiergrid::manifest::Manifest;
use tiergrid::pipeline::ExportPipeline;
use tiergrid::TiergridError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    tracing::debug!(version = %tiergrid::version_string(), "starting");
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Export {
            manifest,
            output,
            backup,
            format,
            overwrite,
            writers,
        } => {
            let config = apply_overrides(config, format, overwrite, writers)?;
            run_export(config, &manifest, output, backup)?;
        }
        Commands::Check { manifest } => {
            check_manifest(&manifest)?;
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/// Log level follows `-q`/`-v` unless `RUST_LOG` is set.
fn init_tracing(quiet: bool, verbose: u8) {
    let default_filter = match (quiet, verbose) {
        (true, _) => "tiergrid=error",
        (false, 0) => "tiergrid=info",
        (false, 1) => "tiergrid=debug",
        (false, _) => "tiergrid=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load configuration from a custom path or `./tiergrid.toml`.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(Path::new(CONFIG_FILENAME))?
    };

    // Apply environment variable overrides
    Ok(config.with_env_overrides())
}

fn apply_overrides(
    mut config: Config,
    format: Option<OutputFormat>,
    overwrite: bool,
    writers: Option<usize>,
) -> Result<Config> {
    if let Some(format) = format {
        config.export.format = format;
    }
    if overwrite {
        config.export.overwrite = true;
    }
    if let Some(writers) = writers {
        config.pipeline.writer_count = writers;
    }
    config.validate()?;
    Ok(config)
}

fn run_export(config: Config, manifest: &Path, output: PathBuf, backup: Option<PathBuf>) -> Result<()> {
    let run = Manifest::load(manifest)
        .and_then(|m| m.into_run())
        .with_context(|| format!("Failed to load run manifest {}", manifest.display()))?;

    let mut sink = FileExportSink::new(Arc::clone(&run.corpus), &output, &config.export);
    if let Some(backup) = backup {
        sink = sink.with_backup_dir(backup);
    }

    let pipeline = ExportPipeline::new(config, Arc::clone(&run.corpus), Arc::new(sink))
        .with_report_dir(&output);

    let stop = pipeline.stop_signal();
    if let Err(e) = ctrlc::set_handler(move || stop.set()) {
        tracing::warn!("Failed to set Ctrl+C handler: {}", e);
    }

    match pipeline.run(run.jobs) {
        Ok(summary) => {
            println!("{summary}");
            Ok(())
        }
        Err(TiergridError::ExportFailed(report)) => {
            eprint!("{report}");
            eprintln!(
                "{} error(s) recorded; see {}",
                report.len(),
                output.join(ERROR_REPORT_FILENAME).display()
            );
            std::process::exit(1);
        }
        Err(TiergridError::Stopped) => {
            eprintln!("Export interrupted");
            std::process::exit(130);
        }
        Err(e) => Err(e.into()),
    }
}

fn check_manifest(manifest: &Path) -> Result<()> {
    let run = Manifest::load(manifest)
        .and_then(|m| m.into_run())
        .with_context(|| format!("Invalid run manifest {}", manifest.display()))?;

    let partitions: usize = run.jobs.iter().map(|job| job.partitions.len()).sum();
    println!(
        "{} recording(s), {} job(s), {} partition(s)",
        run.corpus.len(),
        run.jobs.len(),
        partitions
    );

    for job in &run.jobs {
        for partition in &job.partitions {
            for path in [&partition.word_path, &partition.phone_path] {
                if !path.exists() {
                    println!("  job {}: {} not found (yet)", job.id, path.display());
                }
            }
        }
    }
    Ok(())
}
