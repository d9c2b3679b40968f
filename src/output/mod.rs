//! Run report formatters.
//!
//! - JSON for automation: the whole [`RunReport`], with an RFC 3339 timestamp
//! - CSV for spreadsheets: one row per action
//!
//! # Example
//!
//! ```no_run
//! use crosslink::config::Config;
//! use crosslink::engine::Engine;
//! use crosslink::output::{write_report, ReportFormat};
//! use crosslink::relink::RunMode;
//!
//! let report = Engine::new(Config::default(), RunMode::Simulate).run().unwrap();
//! write_report(&report, ReportFormat::Json, std::io::stdout()).unwrap();
//! ```

pub mod csv;
pub mod json;

use std::io;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use csv::CsvOutput;
pub use json::JsonOutput;

use crate::engine::RunReport;

/// Errors that can occur while writing a report.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during CSV serialization.
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),
}

/// Report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Full report as JSON
    Json,
    /// One row per action
    Csv,
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// Write `report` in `format`.
///
/// # Errors
///
/// Returns [`OutputError`] if serialization or writing fails.
pub fn write_report<W: io::Write>(
    report: &RunReport,
    format: ReportFormat,
    writer: W,
) -> Result<(), OutputError> {
    match format {
        ReportFormat::Json => JsonOutput::new(report).write_to(writer)?,
        ReportFormat::Csv => CsvOutput::new(&report.execution.results).write_to(writer)?,
    }
    Ok(())
}
