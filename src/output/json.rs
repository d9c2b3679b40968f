//! JSON run report.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "generated_at": "2026-01-01T00:00:00Z",
//!   "mode": "simulate",
//!   "exit_code": 0,
//!   "exit_code_name": "CL000",
//!   "volumes": ["/mnt/disk1", "/mnt/disk2"],
//!   "discovery": { "total_files": 100, "duplicate_groups": 1, "...": "..." },
//!   "plan": { "actions": 1, "protected": 0, "...": "..." },
//!   "summary": { "applied": 1, "skipped": 0, "failed": 0, "data_loss": 0, "...": "..." },
//!   "actions": [
//!     {
//!       "source": "/mnt/disk1/movies/x.mkv",
//!       "canonical": "/mnt/disk2/torrents/x.mkv",
//!       "destination_dir": "/mnt/disk2/movies",
//!       "destination": "/mnt/disk2/movies/x.mkv",
//!       "size": 1024,
//!       "outcome": { "status": "applied", "simulated": true }
//!     }
//!   ]
//! }
//! ```

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::duplicates::ScanSummary;
use crate::engine::RunReport;
use crate::relink::{ActionResult, PlanStats, RunMode};

/// Execution counters, without the per-action list.
#[derive(Debug, Clone, Serialize)]
pub struct JsonExecution {
    /// Actions applied (or that would be)
    pub applied: usize,
    /// Actions skipped
    pub skipped: usize,
    /// Actions failed
    pub failed: usize,
    /// Failures after the source was removed
    pub data_loss: usize,
    /// Bytes replaced by links
    pub bytes_relinked: u64,
    /// Whether execution stopped early
    pub interrupted: bool,
}

/// Complete JSON report.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput<'a> {
    /// Report timestamp (RFC 3339)
    pub generated_at: DateTime<Utc>,
    /// Simulation or execution
    pub mode: RunMode,
    /// Numeric exit code
    pub exit_code: i32,
    /// Machine-readable exit code name (e.g. "CL000")
    pub exit_code_name: &'static str,
    /// Scanned volume roots
    pub volumes: &'a [PathBuf],
    /// Discovery statistics
    pub discovery: &'a ScanSummary,
    /// Planning statistics
    pub plan: &'a PlanStats,
    /// Execution counters
    pub summary: JsonExecution,
    /// Per-action outcomes
    pub actions: &'a [ActionResult],
}

impl<'a> JsonOutput<'a> {
    /// Build the JSON view of a report.
    #[must_use]
    pub fn new(report: &'a RunReport) -> Self {
        let exit_code = report.exit_code();
        let execution = &report.execution;
        Self {
            generated_at: report.generated_at,
            mode: report.mode,
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix(),
            volumes: &report.volumes,
            discovery: &report.discovery,
            plan: &report.plan,
            summary: JsonExecution {
                applied: execution.applied,
                skipped: execution.skipped,
                failed: execution.failed,
                data_loss: execution.data_loss,
                bytes_relinked: execution.bytes_relinked,
                interrupted: execution.interrupted,
            },
            actions: &execution.results,
        }
    }

    /// Serialize to compact JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write pretty JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        let json = self.to_json_pretty().map_err(std::io::Error::other)?;
        writeln!(writer, "{json}")
    }
}
