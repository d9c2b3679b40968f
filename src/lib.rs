//! crosslink - cross-volume hardlink deduplication
//!
//! Finds files that exist as independent copies on several disks and
//! replaces every copy outside the priority tree (`torrents` by default) with
//! a hardlink to the priority copy, recreated at the same relative path on
//! the priority copy's disk.
//!
//! The pipeline is [`scanner`] (walk, classify, hash) → [`duplicates`]
//! (name grouping, content grouping, canonical selection) → [`relink`]
//! (planning, link-first execution), driven by [`engine`].

pub mod cli;
pub mod config;
pub mod duplicates;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod output;
pub mod progress;
pub mod relink;
pub mod scanner;
pub mod signal;

use std::fs::File;
use std::io::{self, BufWriter};
use std::sync::Arc;

use anyhow::Context;

use crate::cli::Cli;
use crate::config::Config;
use crate::engine::Engine;
use crate::error::ExitCode;
use crate::events::LogSink;
use crate::output::write_report;
use crate::progress::Progress;

/// Run the CLI and return the exit code for a completed run.
///
/// # Errors
///
/// Returns an error for fatal configuration problems or a report that
/// cannot be written.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let overrides = cli
        .command
        .run_args()
        .map(|(_, args)| args.overrides())
        .unwrap_or_default();
    let config =
        Config::load(cli.config.as_deref(), &overrides).context("failed to load configuration")?;

    let Some((mode, args)) = cli.command.run_args() else {
        print!("{}", config.to_toml()?);
        return Ok(ExitCode::Success);
    };

    let handler = signal::install_handler()?;
    let mut engine = Engine::new(config, mode)
        .with_event_sink(Arc::new(LogSink))
        .with_shutdown_flag(handler.get_flag());
    if !cli.quiet && !cli.no_progress {
        engine = engine.with_progress_callback(Arc::new(Progress::new(false)));
    }

    log::info!(
        "Starting {} run",
        if mode.is_simulation() {
            "simulated"
        } else {
            "live"
        }
    );
    let report = engine.run()?;

    let report_on_stdout = args.report.is_some() && args.report_file.is_none();
    if let Some(format) = args.report {
        match &args.report_file {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("failed to create report {}", path.display()))?;
                write_report(&report, format, BufWriter::new(file))?;
                log::info!("Wrote {} report to {}", format, path.display());
            }
            None => write_report(&report, format, io::stdout().lock())?,
        }
    }

    if !cli.quiet {
        if report_on_stdout {
            eprintln!("{}", report.summary_text());
        } else {
            println!("{}", report.summary_text());
        }
    }

    Ok(report.exit_code())
}
