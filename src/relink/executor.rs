//! Relink execution.
//!
//! # Overview
//!
//! Each [`RelinkAction`] runs through a small state machine ending in one of
//! three outcomes: applied, skipped or failed. The commit is link-first:
//!
//! 1. **Pre-check** - an existing destination that is already the canonical
//!    file means the action was done before (skipped); anything else there
//!    is a conflict (failed). Nothing is ever overwritten.
//! 2. **Guards** - the canonical and source files must still exist.
//! 3. **Directory ensure** - create the destination directory if needed.
//! 4. **Link** - hardlink the canonical data at the destination.
//! 5. **Verify** - the new link must have the canonical's inode; if not it
//!    is removed again.
//! 6. **Remove source** - only now is the duplicate deleted. If that fails
//!    the new link is rolled back, restoring the state before the action.
//!
//! At no point after an action completes is there a logical file with
//! neither its original nor a working link. The one exception the executor
//! can detect (the link vanished after the source was removed) is reported
//! as a failure with `source_removed` set, at the highest severity.
//!
//! In [`RunMode::Simulate`] the pre-check and guards run against the real
//! filesystem, so conflicts are predicted accurately; every later step is
//! only reported as a [`RunEvent::StepSimulated`]. Within
//! [`RelinkExecutor::execute_all`], destinations taken by earlier applied
//! actions count as occupied, so a simulated run reports the same outcome
//! for a second claimant of one destination as a real run would.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use super::fs_ops::{same_file, FsOps, StdFs};
use super::plan::RelinkAction;
use crate::events::{EventSink, NullSink, RunEvent, SimulatedStep};
use crate::progress::ProgressCallback;

/// Whether mutations are performed or only reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Check and report, never mutate
    #[default]
    Simulate,
    /// Perform the mutations
    Execute,
}

impl RunMode {
    /// Whether this is a simulation.
    #[must_use]
    pub fn is_simulation(self) -> bool {
        self == Self::Simulate
    }
}

/// Reasons an action can fail.
#[derive(thiserror::Error, Debug)]
pub enum RelinkError {
    /// Something other than the canonical file already sits at the destination.
    #[error("conflict: {0} already exists and is not the canonical file")]
    Conflict(PathBuf),

    /// The canonical file disappeared since the scan.
    #[error("canonical file is missing: {0}")]
    CanonicalMissing(PathBuf),

    /// The source file disappeared since the scan.
    #[error("source file is missing: {0}")]
    SourceMissing(PathBuf),

    /// A path could not be inspected.
    #[error("cannot inspect {path}: {source}")]
    Inspect {
        /// Path being inspected
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The destination directory could not be created.
    #[error("cannot create directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The hardlink could not be created.
    #[error("cannot create hardlink {path}: {source}")]
    Link {
        /// Intended link path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The new link does not point at the canonical data.
    #[error("hardlink {0} does not point at the canonical file")]
    Verify(PathBuf),

    /// The source could not be removed; the new link was rolled back.
    #[error("cannot remove source {path}: {source}")]
    RemoveSource {
        /// Source path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The source was removed but the link is no longer valid.
    #[error("source removed but hardlink {0} is no longer valid")]
    LinkLost(PathBuf),
}

impl RelinkError {
    /// Whether the source file was already gone when this failure happened.
    #[must_use]
    pub fn source_removed(&self) -> bool {
        matches!(self, Self::LinkLost(_))
    }
}

/// Terminal state of one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// The action completed (or would complete, when simulated).
    Applied {
        /// Whether the filesystem was left untouched
        simulated: bool,
    },
    /// Nothing needed doing.
    Skipped {
        /// Why
        reason: String,
    },
    /// The action was abandoned.
    Failed {
        /// Why
        reason: String,
        /// Whether the source was already removed
        source_removed: bool,
    },
}

impl ActionOutcome {
    fn failed(error: &RelinkError) -> Self {
        Self::Failed {
            reason: error.to_string(),
            source_removed: error.source_removed(),
        }
    }

    /// Short status name.
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

/// An action together with its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    /// The action
    #[serde(flatten)]
    pub action: RelinkAction,
    /// What happened
    pub outcome: ActionOutcome,
}

/// Results of executing a batch of actions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionSummary {
    /// Per-action results in execution order
    pub results: Vec<ActionResult>,
    /// Actions applied (or that would be, when simulated)
    pub applied: usize,
    /// Actions skipped
    pub skipped: usize,
    /// Actions failed
    pub failed: usize,
    /// Failures after the source was removed
    pub data_loss: usize,
    /// Bytes of duplicates replaced by links
    pub bytes_relinked: u64,
    /// Whether execution stopped early on a shutdown request
    pub interrupted: bool,
}

impl ExecutionSummary {
    /// Total number of actions that reached a terminal state.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.results.len()
    }

    /// Whether every action was applied or skipped.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Human-readable summary of the operation.
    #[must_use]
    pub fn summary(&self, mode: RunMode) -> String {
        let verb = if mode.is_simulation() {
            "Would relink"
        } else {
            "Relinked"
        };
        format!(
            "{} {} file(s) ({}), {} skipped, {} failed",
            verb,
            self.applied,
            bytesize::ByteSize::b(self.bytes_relinked),
            self.skipped,
            self.failed
        )
    }

    fn record(&mut self, action: RelinkAction, outcome: ActionOutcome) {
        match &outcome {
            ActionOutcome::Applied { .. } => {
                self.applied += 1;
                self.bytes_relinked += action.size;
            }
            ActionOutcome::Skipped { .. } => self.skipped += 1,
            ActionOutcome::Failed { source_removed, .. } => {
                self.failed += 1;
                if *source_removed {
                    self.data_loss += 1;
                }
            }
        }
        self.results.push(ActionResult { action, outcome });
    }
}

/// Applies relink actions one at a time.
pub struct RelinkExecutor {
    fs: Arc<dyn FsOps>,
    mode: RunMode,
    event_sink: Arc<dyn EventSink>,
    shutdown_flag: Option<Arc<AtomicBool>>,
    progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for RelinkExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelinkExecutor")
            .field("mode", &self.mode)
            .field("shutdown_flag", &self.shutdown_flag)
            .finish_non_exhaustive()
    }
}

enum Precheck {
    Proceed,
    AlreadyLinked,
}

impl RelinkExecutor {
    /// Create an executor on the real filesystem.
    #[must_use]
    pub fn new(mode: RunMode) -> Self {
        Self {
            fs: Arc::new(StdFs),
            mode,
            event_sink: Arc::new(NullSink),
            shutdown_flag: None,
            progress_callback: None,
        }
    }

    /// Replace the filesystem implementation.
    #[must_use]
    pub fn with_fs(mut self, fs: Arc<dyn FsOps>) -> Self {
        self.fs = fs;
        self
    }

    /// Set the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Set the shutdown flag, checked between actions.
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

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Run one action to a terminal state and report it.
    pub fn execute(&self, action: &RelinkAction) -> ActionOutcome {
        self.execute_claimed(action, &HashMap::new())
    }

    /// `claimed` maps destinations linked earlier in this run to their canonical.
    fn execute_claimed(
        &self,
        action: &RelinkAction,
        claimed: &HashMap<PathBuf, PathBuf>,
    ) -> ActionOutcome {
        let outcome = match self.run(action, claimed) {
            Ok(outcome) => outcome,
            Err(e) => ActionOutcome::failed(&e),
        };

        let event = match &outcome {
            ActionOutcome::Applied { simulated } => RunEvent::ActionApplied {
                action: action.clone(),
                simulated: *simulated,
            },
            ActionOutcome::Skipped { reason } => RunEvent::ActionSkipped {
                action: action.clone(),
                reason: reason.clone(),
            },
            ActionOutcome::Failed {
                reason,
                source_removed,
            } => RunEvent::ActionFailed {
                action: action.clone(),
                reason: reason.clone(),
                source_removed: *source_removed,
            },
        };
        self.event_sink.emit(&event);
        outcome
    }

    /// Run all actions in order.
    ///
    /// Actions are serialized so directory creation never races a conflict
    /// check for another action. A shutdown request stops before the next
    /// action; the one in flight always completes.
    #[must_use]
    pub fn execute_all(&self, actions: Vec<RelinkAction>) -> ExecutionSummary {
        let mut summary = ExecutionSummary::default();
        if actions.is_empty() {
            return summary;
        }

        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_start("relinking", actions.len());
        }

        let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
        for (idx, action) in actions.into_iter().enumerate() {
            if self.is_shutdown_requested() {
                log::info!("Relinking interrupted after {} action(s)", idx);
                summary.interrupted = true;
                break;
            }
            if let Some(ref callback) = self.progress_callback {
                callback.on_progress(idx + 1, &action.source.to_string_lossy());
            }
            let outcome = self.execute_claimed(&action, &claimed);
            if let ActionOutcome::Applied { .. } = outcome {
                claimed.insert(action.destination.clone(), action.canonical.clone());
            }
            if let Some(ref callback) = self.progress_callback {
                callback.on_item_completed(action.size);
            }
            summary.record(action, outcome);
        }

        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_end("relinking");
        }

        log::info!("{}", summary.summary(self.mode));
        summary
    }

    fn run(
        &self,
        action: &RelinkAction,
        claimed: &HashMap<PathBuf, PathBuf>,
    ) -> Result<ActionOutcome, RelinkError> {
        if let Precheck::AlreadyLinked = self.precheck(action, claimed)? {
            return Ok(ActionOutcome::Skipped {
                reason: "destination already links to the canonical file".to_string(),
            });
        }

        if !self.fs.exists(&action.canonical) {
            return Err(RelinkError::CanonicalMissing(action.canonical.clone()));
        }
        if !self.fs.exists(&action.source) {
            return Err(RelinkError::SourceMissing(action.source.clone()));
        }

        if self.mode.is_simulation() {
            if !self.fs.is_dir(&action.destination_dir) {
                self.simulate(action, SimulatedStep::CreateDir);
            }
            self.simulate(action, SimulatedStep::Link);
            self.simulate(action, SimulatedStep::RemoveSource);
            return Ok(ActionOutcome::Applied { simulated: true });
        }

        if !self.fs.is_dir(&action.destination_dir) {
            self.fs
                .create_dir_all(&action.destination_dir)
                .map_err(|source| RelinkError::CreateDir {
                    path: action.destination_dir.clone(),
                    source,
                })?;
            log::debug!("Created directory {}", action.destination_dir.display());
        }

        self.fs
            .hard_link(&action.canonical, &action.destination)
            .map_err(|source| {
                if source.kind() == io::ErrorKind::AlreadyExists {
                    RelinkError::Conflict(action.destination.clone())
                } else {
                    RelinkError::Link {
                        path: action.destination.clone(),
                        source,
                    }
                }
            })?;

        if !self.link_is_valid(action) {
            self.roll_back(&action.destination);
            return Err(RelinkError::Verify(action.destination.clone()));
        }

        if let Err(source) = self.fs.remove_file(&action.source) {
            self.roll_back(&action.destination);
            return Err(RelinkError::RemoveSource {
                path: action.source.clone(),
                source,
            });
        }

        if !self.link_is_valid(action) {
            return Err(RelinkError::LinkLost(action.destination.clone()));
        }

        Ok(ActionOutcome::Applied { simulated: false })
    }

    fn simulate(&self, action: &RelinkAction, step: SimulatedStep) {
        self.event_sink.emit(&RunEvent::StepSimulated {
            action: action.clone(),
            step,
        });
    }

    fn precheck(
        &self,
        action: &RelinkAction,
        claimed: &HashMap<PathBuf, PathBuf>,
    ) -> Result<Precheck, RelinkError> {
        // A real run has already linked these; a simulated one only pretended to.
        if let Some(canonical) = claimed.get(&action.destination) {
            return if canonical == &action.canonical {
                Ok(Precheck::AlreadyLinked)
            } else {
                Err(RelinkError::Conflict(action.destination.clone()))
            };
        }
        if !self.fs.exists(&action.destination) {
            return Ok(Precheck::Proceed);
        }
        match same_file(self.fs.as_ref(), &action.destination, &action.canonical) {
            Ok(true) => Ok(Precheck::AlreadyLinked),
            Ok(false) => Err(RelinkError::Conflict(action.destination.clone())),
            Err(source) => Err(RelinkError::Inspect {
                path: action.destination.clone(),
                source,
            }),
        }
    }

    /// The link exists and carries the canonical's identity.
    fn link_is_valid(&self, action: &RelinkAction) -> bool {
        match (
            self.fs.identity(&action.destination),
            self.fs.identity(&action.canonical),
        ) {
            (Ok(Some(link)), Ok(Some(canonical))) => link == canonical,
            (Ok(None), Ok(None)) => self.fs.exists(&action.destination),
            _ => false,
        }
    }

    fn roll_back(&self, link: &Path) {
        if let Err(e) = self.fs.remove_file(link) {
            log::error!("Failed to roll back link {}: {}", link.display(), e);
        } else {
            log::debug!("Rolled back link {}", link.display());
        }
    }
}
