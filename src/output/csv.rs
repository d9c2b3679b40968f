//! CSV run report, one row per action.
//!
//! # Columns
//!
//! - `source`: duplicate that is (or would be) replaced
//! - `canonical`: file the link points at
//! - `destination`: path of the link on the canonical's volume
//! - `size`: bytes
//! - `status`: `applied`, `skipped` or `failed`
//! - `simulated`: whether the filesystem was left untouched
//! - `reason`: why the action was skipped or failed
//! - `source_removed`: a failure happened after the source was deleted

use std::io;

use serde::Serialize;

use super::OutputError;
use crate::relink::{ActionOutcome, ActionResult};

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    source: String,
    canonical: String,
    destination: String,
    size: u64,
    status: &'static str,
    simulated: bool,
    reason: &'a str,
    source_removed: bool,
}

impl<'a> CsvRow<'a> {
    fn from_result(result: &'a ActionResult) -> Self {
        let (simulated, reason, source_removed) = match &result.outcome {
            ActionOutcome::Applied { simulated } => (*simulated, "", false),
            ActionOutcome::Skipped { reason } => (false, reason.as_str(), false),
            ActionOutcome::Failed {
                reason,
                source_removed,
            } => (false, reason.as_str(), *source_removed),
        };
        Self {
            source: result.action.source.to_string_lossy().to_string(),
            canonical: result.action.canonical.to_string_lossy().to_string(),
            destination: result.action.destination.to_string_lossy().to_string(),
            size: result.action.size,
            status: result.outcome.status(),
            simulated,
            reason,
            source_removed,
        }
    }
}

/// CSV output formatter.
pub struct CsvOutput<'a> {
    results: &'a [ActionResult],
}

impl<'a> CsvOutput<'a> {
    /// Create a formatter over per-action results.
    #[must_use]
    pub fn new(results: &'a [ActionResult]) -> Self {
        Self { results }
    }

    /// Write the CSV output to the given writer.
    ///
    /// # Errors
    ///
    /// Returns `OutputError` if writing or serialization fails.
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), OutputError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        if self.results.is_empty() {
            csv_writer.write_record([
                "source",
                "canonical",
                "destination",
                "size",
                "status",
                "simulated",
                "reason",
                "source_removed",
            ])?;
        }
        for result in self.results {
            csv_writer.serialize(CsvRow::from_result(result))?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Generate CSV output as a string.
    ///
    /// # Errors
    ///
    /// Returns `OutputError` if serialization fails.
    pub fn to_string(&self) -> Result<String, OutputError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}
