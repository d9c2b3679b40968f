//! Command-line interface definitions for crosslink.
//!
//! Global options (verbosity, config file, error format) apply to every
//! subcommand. `plan` and `apply` share the same run options and differ only
//! in whether mutations are performed.
//!
//! # Example
//!
//! ```bash
//! # See what would be relinked across two disks
//! crosslink plan /mnt/disk1 /mnt/disk2
//!
//! # Discover disks by glob, skip appdata on every disk, write a CSV report
//! crosslink apply --volume-glob '/mnt/disk*' -x '{volume}/appdata' \
//!     --report csv --report-file relink.csv
//!
//! # Print the effective configuration
//! crosslink show-config
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::ConfigOverrides;
use crate::output::ReportFormat;
use crate::relink::RunMode;

/// Cross-volume duplicate finder that relinks copies to a priority master.
///
/// Files with the same name and content on different disks are replaced by
/// hardlinks to the copy under a `torrents` directory, recreated at the same
/// relative path on that copy's disk.
#[derive(Debug, Parser)]
#[command(name = "crosslink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to a TOML config file
    ///
    /// If not specified, the platform config directory is searched.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Print fatal errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Disable progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Find duplicates and report what would be relinked, without changing anything
    Plan(RunArgs),
    /// Find duplicates and relink them
    Apply(RunArgs),
    /// Print the effective configuration as TOML
    ShowConfig,
}

impl Commands {
    /// Run mode and options for `plan`/`apply`.
    #[must_use]
    pub fn run_args(&self) -> Option<(RunMode, &RunArgs)> {
        match self {
            Self::Plan(args) => Some((RunMode::Simulate, args)),
            Self::Apply(args) => Some((RunMode::Execute, args)),
            Self::ShowConfig => None,
        }
    }
}

/// Options shared by `plan` and `apply`.
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Volume roots to scan, in order (replaces configured volumes)
    #[arg(value_name = "VOLUME")]
    pub volumes: Vec<PathBuf>,

    /// Glob expanding to volume roots, e.g. '/mnt/disk*' (repeatable)
    ///
    /// `*` is only allowed in the final path segment.
    #[arg(long = "volume-glob", value_name = "GLOB")]
    pub volume_globs: Vec<String>,

    /// Directory to exclude (repeatable)
    ///
    /// `{volume}` stands for every volume root, e.g. '{volume}/appdata'.
    /// Patterns that do not name an existing directory are ignored.
    #[arg(short = 'x', long = "exclude", value_name = "PATTERN")]
    pub exclusions: Vec<String>,

    /// Regex matched case-insensitively against each path segment to find
    /// the priority copy (default: ^torrents?$)
    #[arg(long, value_name = "REGEX")]
    pub priority_segment: Option<String>,

    /// Number of I/O threads for hashing (default: 4)
    ///
    /// Lower values reduce disk thrashing on HDDs.
    #[arg(long, value_name = "N")]
    pub io_threads: Option<usize>,

    /// Minimum file size to consider (e.g., 1KB, 1MB, 1GB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Write a run report in this format
    #[arg(long, value_enum, value_name = "FORMAT")]
    pub report: Option<ReportFormat>,

    /// Write the report to a file instead of stdout
    #[arg(long, value_name = "PATH", requires = "report")]
    pub report_file: Option<PathBuf>,
}

impl RunArgs {
    /// Configuration overrides set by these flags.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            volumes: self.volumes.clone(),
            volume_globs: self.volume_globs.clone(),
            exclusions: self.exclusions.clone(),
            priority_segment: self.priority_segment.clone(),
            io_threads: self.io_threads,
            min_size: self.min_size,
            skip_hidden: self.skip_hidden.then_some(true),
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// # Examples
///
/// ```
/// use crosslink::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KiB").unwrap(), 1024);
/// assert_eq!(parse_size("10MB").unwrap(), 10_000_000);
/// ```
///
/// # Errors
///
/// Returns an error message for an empty string, a malformed number or an
/// unknown suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
