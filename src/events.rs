//! Structured run events and the sinks that consume them.
//!
//! The discovery and relink pipeline never formats log lines for its
//! decisions. It emits [`RunEvent`] values into an [`EventSink`]; what
//! happens to them (logging, collection for tests, both) is up to the sink.
//!
//! # Example
//!
//! ```
//! use crosslink::events::{EventSink, LogSink, RecordingSink, RunEvent};
//! use std::path::PathBuf;
//!
//! let recorder = RecordingSink::new();
//! let sink = (LogSink, &recorder);
//! sink.emit(&RunEvent::HashFailed {
//!     path: PathBuf::from("/mnt/disk1/x.mkv"),
//!     reason: "Permission denied".to_string(),
//! });
//! assert_eq!(recorder.len(), 1);
//! ```

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::relink::RelinkAction;

/// A decision or outcome observed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// A subtree or file could not be enumerated.
    ScanError {
        /// Path that failed
        path: PathBuf,
        /// Human-readable reason
        reason: String,
    },
    /// A candidate could not be hashed and was dropped.
    HashFailed {
        /// Path that failed
        path: PathBuf,
        /// Human-readable reason
        reason: String,
    },
    /// A content group spanning several volumes was found.
    GroupDiscovered {
        /// Hex digest shared by all members
        digest: String,
        /// Size of each member in bytes
        size: u64,
        /// Member paths in lexicographic order
        members: Vec<PathBuf>,
        /// Number of distinct volumes among the members
        volumes: usize,
    },
    /// A canonical file was chosen for a group.
    CanonicalSelected {
        /// Hex digest of the group
        digest: String,
        /// The chosen canonical path
        canonical: PathBuf,
    },
    /// No member of a group matched the priority pattern.
    NoCanonical {
        /// Hex digest of the group
        digest: String,
        /// Member paths in lexicographic order
        members: Vec<PathBuf>,
    },
    /// A member that also matches the priority pattern was left alone.
    MemberProtected {
        /// The protected path
        path: PathBuf,
        /// Canonical path of its group
        canonical: PathBuf,
    },
    /// A member on another volume was left out of the plan.
    MemberNotPlanned {
        /// The member path
        path: PathBuf,
        /// Canonical path of its group
        canonical: PathBuf,
        /// Why no action was planned
        reason: NotPlannedReason,
    },
    /// A relink action was planned.
    ActionPlanned {
        /// The planned action
        action: RelinkAction,
    },
    /// A mutation step a simulated action would perform.
    StepSimulated {
        /// The action being simulated
        action: RelinkAction,
        /// The step
        step: SimulatedStep,
    },
    /// A relink action completed (or would complete, when simulated).
    ActionApplied {
        /// The action
        action: RelinkAction,
        /// Whether the filesystem was left untouched
        simulated: bool,
    },
    /// A relink action was not needed.
    ActionSkipped {
        /// The action
        action: RelinkAction,
        /// Why it was skipped
        reason: String,
    },
    /// A relink action failed.
    ActionFailed {
        /// The action
        action: RelinkAction,
        /// Why it failed
        reason: String,
        /// Whether the source was already removed when the failure happened
        source_removed: bool,
    },
}

/// Why a group member got no relink action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotPlannedReason {
    /// It lives on the canonical's own volume.
    SameVolume,
    /// It already shares the canonical's inode.
    AlreadyLinked,
    /// Its path is not below its volume root.
    Unclassified,
}

/// Mutation steps after the pre-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatedStep {
    /// Create the destination directory.
    CreateDir,
    /// Hardlink the canonical at the destination.
    Link,
    /// Remove the source.
    RemoveSource,
}

impl RunEvent {
    /// Short machine name of the event kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ScanError { .. } => "scan_error",
            Self::HashFailed { .. } => "hash_failed",
            Self::GroupDiscovered { .. } => "group_discovered",
            Self::CanonicalSelected { .. } => "canonical_selected",
            Self::NoCanonical { .. } => "no_canonical",
            Self::MemberProtected { .. } => "member_protected",
            Self::MemberNotPlanned { .. } => "member_not_planned",
            Self::StepSimulated { .. } => "step_simulated",
            Self::ActionPlanned { .. } => "action_planned",
            Self::ActionApplied { .. } => "action_applied",
            Self::ActionSkipped { .. } => "action_skipped",
            Self::ActionFailed { .. } => "action_failed",
        }
    }

    /// Log level a human-facing sink should use for this event.
    #[must_use]
    pub fn level(&self) -> log::Level {
        match self {
            Self::ActionFailed {
                source_removed: true,
                ..
            } => log::Level::Error,
            Self::ScanError { .. } | Self::HashFailed { .. } | Self::ActionFailed { .. } => {
                log::Level::Warn
            }
            Self::MemberNotPlanned {
                reason: NotPlannedReason::Unclassified,
                ..
            } => log::Level::Warn,
            Self::MemberNotPlanned {
                reason: NotPlannedReason::SameVolume,
                ..
            } => log::Level::Trace,
            Self::ActionPlanned { .. }
            | Self::MemberProtected { .. }
            | Self::MemberNotPlanned { .. }
            | Self::StepSimulated { .. } => log::Level::Debug,
            _ => log::Level::Info,
        }
    }
}

/// Consumer of run events.
pub trait EventSink: Send + Sync {
    /// Receive one event.
    fn emit(&self, event: &RunEvent);
}

impl<T: EventSink + ?Sized> EventSink for &T {
    fn emit(&self, event: &RunEvent) {
        (**self).emit(event);
    }
}

impl<T: EventSink + ?Sized> EventSink for std::sync::Arc<T> {
    fn emit(&self, event: &RunEvent) {
        (**self).emit(event);
    }
}

impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn emit(&self, event: &RunEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &RunEvent) {}
}

/// Sink that writes events through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &RunEvent) {
        let level = event.level();
        match event {
            RunEvent::ScanError { path, reason } => {
                log::log!(level, "Cannot scan {}: {}", path.display(), reason);
            }
            RunEvent::HashFailed { path, reason } => {
                log::log!(level, "Failed to hash {}: {}", path.display(), reason);
            }
            RunEvent::GroupDiscovered {
                digest,
                size,
                members,
                volumes,
            } => {
                log::log!(
                    level,
                    "Duplicate group {}: {} files across {} volumes ({})",
                    &digest[..digest.len().min(16)],
                    members.len(),
                    volumes,
                    bytesize::ByteSize::b(*size)
                );
            }
            RunEvent::CanonicalSelected { canonical, .. } => {
                log::log!(level, "Canonical: {}", canonical.display());
            }
            RunEvent::NoCanonical { digest, members } => {
                log::log!(
                    level,
                    "No priority copy for group {} ({} files), leaving it alone",
                    &digest[..digest.len().min(16)],
                    members.len()
                );
            }
            RunEvent::MemberProtected { path, .. } => {
                log::log!(level, "Protected priority copy: {}", path.display());
            }
            RunEvent::MemberNotPlanned { path, reason, .. } => match reason {
                NotPlannedReason::SameVolume => {
                    log::log!(
                        level,
                        "Same volume as canonical, not relinking: {}",
                        path.display()
                    );
                }
                NotPlannedReason::AlreadyLinked => {
                    log::log!(level, "{} already shares the canonical inode", path.display());
                }
                NotPlannedReason::Unclassified => {
                    log::log!(
                        level,
                        "Cannot map {} below its volume root; not planning",
                        path.display()
                    );
                }
            },
            RunEvent::StepSimulated { action, step } => match step {
                SimulatedStep::CreateDir => {
                    log::log!(
                        level,
                        "Would create directory {}",
                        action.destination_dir.display()
                    );
                }
                SimulatedStep::Link => {
                    log::log!(
                        level,
                        "Would link {} -> {}",
                        action.destination.display(),
                        action.canonical.display()
                    );
                }
                SimulatedStep::RemoveSource => {
                    log::log!(level, "Would remove {}", action.source.display());
                }
            },
            RunEvent::ActionPlanned { action } => {
                log::log!(
                    level,
                    "Planned: {} -> {}",
                    action.source.display(),
                    action.destination.display()
                );
            }
            RunEvent::ActionApplied { action, simulated } => {
                let verb = if *simulated { "Would relink" } else { "Relinked" };
                log::log!(
                    level,
                    "{} {} -> {} (link to {})",
                    verb,
                    action.source.display(),
                    action.destination.display(),
                    action.canonical.display()
                );
            }
            RunEvent::ActionSkipped { action, reason } => {
                log::log!(
                    level,
                    "Skipped {}: {}",
                    action.source.display(),
                    reason
                );
            }
            RunEvent::ActionFailed {
                action,
                reason,
                source_removed,
            } => {
                if *source_removed {
                    log::log!(
                        level,
                        "DATA LOSS: {} was removed but no valid link exists at {}: {}",
                        action.source.display(),
                        action.destination.display(),
                        reason
                    );
                } else {
                    log::log!(
                        level,
                        "Failed to relink {}: {}",
                        action.source.display(),
                        reason
                    );
                }
            }
        }
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingSink {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events received so far.
    #[must_use]
    pub fn events(&self) -> Vec<RunEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of events received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no events were received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of events of the given kind.
    #[must_use]
    pub fn count(&self, kind: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.kind() == kind)
            .count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &RunEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
