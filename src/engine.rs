//! Run orchestration.
//!
//! An [`Engine`] runs the phases strictly in order: resolve volumes, walk,
//! group by name, hash, select canonicals, plan, execute. Nothing is mutated
//! before the last phase, and only in [`RunMode::Execute`].
//!
//! ```no_run
//! use crosslink::config::Config;
//! use crosslink::engine::Engine;
//! use crosslink::relink::RunMode;
//! use std::path::PathBuf;
//!
//! let config = Config {
//!     volumes: vec![PathBuf::from("/mnt/disk1"), PathBuf::from("/mnt/disk2")],
//!     ..Default::default()
//! };
//! let report = Engine::new(config, RunMode::Simulate).run().unwrap();
//! println!("{}", report.execution.summary(report.mode));
//! ```

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{Config, ConfigError};
use crate::duplicates::{resolve_groups, DuplicateFinder, FinderConfig, FinderError, ScanSummary};
use crate::error::ExitCode;
use crate::events::{EventSink, NullSink};
use crate::progress::ProgressCallback;
use crate::relink::{ExecutionSummary, FsOps, PlanStats, RelinkExecutor, RelinkPlanner, RunMode};
use crate::scanner::volume::VolumeError;
use crate::scanner::{ContentHasher, FileIdentity};

/// Errors that end a run before any action is executed.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// Fatal configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<FinderError> for EngineError {
    fn from(err: FinderError) -> Self {
        match err {
            FinderError::NoVolumes => Self::Config(ConfigError::Volumes(VolumeError::NoVolumes)),
        }
    }
}

/// Everything a run decided and did.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// When the report was produced
    pub generated_at: DateTime<Utc>,
    /// Simulation or real execution
    pub mode: RunMode,
    /// Volume roots that were scanned
    pub volumes: Vec<PathBuf>,
    /// Discovery statistics
    pub discovery: ScanSummary,
    /// Planning statistics
    pub plan: PlanStats,
    /// Per-action outcomes
    pub execution: ExecutionSummary,
}

impl RunReport {
    /// Exit code for this run.
    ///
    /// Interruption wins, then data loss, then any failure or unreadable
    /// file, then "nothing applied".
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        if self.execution.interrupted || self.discovery.interrupted {
            ExitCode::Interrupted
        } else if self.execution.data_loss > 0 {
            ExitCode::DataLoss
        } else if self.execution.failed > 0
            || self.discovery.scan_errors > 0
            || self.discovery.content.failed_files > 0
        {
            ExitCode::PartialSuccess
        } else if self.execution.applied == 0 {
            ExitCode::NothingToDo
        } else {
            ExitCode::Success
        }
    }

    /// Multi-line human summary.
    #[must_use]
    pub fn summary_text(&self) -> String {
        let d = &self.discovery;
        let mut lines = vec![
            format!(
                "Scanned {} file(s) ({}) on {} volume(s), {} scan error(s)",
                d.total_files,
                d.total_size_display(),
                d.volumes,
                d.scan_errors
            ),
            format!(
                "Phase 1: {} of {} name(s) span volumes, {} candidate file(s)",
                d.names.candidate_groups, d.names.unique_names, d.names.candidate_files
            ),
            format!(
                "Phase 2: {} cross-volume group(s), {} duplicate copies, {} reclaimable",
                d.duplicate_groups,
                d.duplicate_files,
                d.reclaimable_display()
            ),
            format!(
                "Plan: {} action(s), {} group(s) without canonical, {} protected, {} already linked",
                self.plan.actions,
                self.plan.groups_without_canonical,
                self.plan.protected,
                self.plan.already_linked
            ),
            self.execution.summary(self.mode),
        ];
        if self.execution.data_loss > 0 {
            lines.push(format!(
                "DATA LOSS: {} file(s) were removed without a working link",
                self.execution.data_loss
            ));
        }
        if self.discovery.interrupted {
            lines.push("Interrupted during discovery; nothing was planned".to_string());
        } else if self.execution.interrupted {
            lines.push("Interrupted before all actions ran".to_string());
        }
        lines.join("\n")
    }
}

/// Runs the full pipeline for one configuration.
pub struct Engine {
    config: Config,
    mode: RunMode,
    event_sink: Arc<dyn EventSink>,
    shutdown_flag: Option<Arc<AtomicBool>>,
    progress_callback: Option<Arc<dyn ProgressCallback>>,
    fs: Option<Arc<dyn FsOps>>,
    hasher: Option<Arc<dyn ContentHasher>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine for `config` in `mode`.
    #[must_use]
    pub fn new(config: Config, mode: RunMode) -> Self {
        Self {
            config,
            mode,
            event_sink: Arc::new(NullSink),
            shutdown_flag: None,
            progress_callback: None,
            fs: None,
            hasher: None,
        }
    }

    /// Set the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Set the shutdown flag.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Replace the filesystem used by the executor.
    #[must_use]
    pub fn with_fs(mut self, fs: Arc<dyn FsOps>) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Replace the content hasher.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    /// The configuration this engine runs with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every phase.
    ///
    /// Per-file and per-action problems are recorded in the report; only
    /// configuration errors are returned as errors. A shutdown during
    /// discovery yields a report with `discovery.interrupted` set and no
    /// plan; a shutdown during execution stops before the next action.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] before anything is scanned if the
    /// volumes or priority pattern are invalid.
    pub fn run(&self) -> Result<RunReport, EngineError> {
        self.config.validate()?;
        let pattern = self.config.priority_pattern()?;
        let volumes = self.config.resolve_volumes()?;
        if self.config.skip_shared_inodes && !FileIdentity::is_supported() {
            log::debug!("Inode identities unavailable, shared-inode checks disabled");
        }

        let mut finder_config = FinderConfig::default()
            .with_io_threads(self.config.io_threads)
            .with_walker_config(self.config.walker_config())
            .with_exclusions(self.config.exclusions.clone())
            .with_event_sink(Arc::clone(&self.event_sink));
        if let Some(ref flag) = self.shutdown_flag {
            finder_config = finder_config.with_shutdown_flag(Arc::clone(flag));
        }
        if let Some(ref callback) = self.progress_callback {
            finder_config = finder_config.with_progress_callback(Arc::clone(callback));
        }
        let mut finder = DuplicateFinder::new(finder_config);
        if let Some(ref hasher) = self.hasher {
            finder = finder.with_hasher(Arc::clone(hasher));
        }

        let (groups, discovery) = finder.find_duplicates(&volumes)?;
        if discovery.interrupted {
            return Ok(RunReport {
                generated_at: Utc::now(),
                mode: self.mode,
                volumes: volumes.roots().to_vec(),
                discovery,
                plan: PlanStats::default(),
                execution: ExecutionSummary::default(),
            });
        }

        let resolved = resolve_groups(groups, &pattern, &*self.event_sink);

        let planner = RelinkPlanner::new(pattern)
            .with_skip_shared_inodes(self.config.skip_shared_inodes)
            .with_event_sink(Arc::clone(&self.event_sink));
        let (actions, plan) = planner.plan(&resolved);

        let mut executor =
            RelinkExecutor::new(self.mode).with_event_sink(Arc::clone(&self.event_sink));
        if let Some(ref fs) = self.fs {
            executor = executor.with_fs(Arc::clone(fs));
        }
        if let Some(ref flag) = self.shutdown_flag {
            executor = executor.with_shutdown_flag(Arc::clone(flag));
        }
        if let Some(ref callback) = self.progress_callback {
            executor = executor.with_progress_callback(Arc::clone(callback));
        }
        let execution = executor.execute_all(actions);

        Ok(RunReport {
            generated_at: Utc::now(),
            mode: self.mode,
            volumes: volumes.roots().to_vec(),
            discovery,
            plan,
            execution,
        })
    }
}
