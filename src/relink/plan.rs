//! Relink planning.
//!
//! For every resolved group with a canonical file, each other member on a
//! different volume becomes one [`RelinkAction`]: replace the member with a
//! hardlink to the canonical data, placed on the canonical's volume at the
//! member's own volume-relative path.
//!
//! ```text
//! canonical  /v2/torrents/x.mkv
//! member     /v1/movies/x.mkv      relative: movies/x.mkv
//! link       /v2/movies/x.mkv      = /v2 + movies/x.mkv
//! ```
//!
//! Planning never touches the filesystem.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::duplicates::{PriorityPattern, ResolvedGroup};
use crate::events::{EventSink, NotPlannedReason, NullSink, RunEvent};
use crate::scanner::FileRecord;

/// One planned replacement of a duplicate by a hardlink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelinkAction {
    /// Duplicate to be removed once the link is verified
    pub source: PathBuf,
    /// Canonical file the link points at
    pub canonical: PathBuf,
    /// Directory that will hold the link
    pub destination_dir: PathBuf,
    /// Path of the new link
    pub destination: PathBuf,
    /// Size of the data in bytes
    pub size: u64,
}

/// Compute the action replacing `member` with a link to `canonical`.
///
/// Returns `None` when the member cannot be mapped below its own volume
/// root; such a record is never assigned a destination.
#[must_use]
pub fn action_for(member: &FileRecord, canonical: &FileRecord) -> Option<RelinkAction> {
    let relative = member.relative_path()?;
    if relative.as_os_str().is_empty() {
        return None;
    }
    let destination = canonical.volume.root().join(relative);
    let destination_dir = destination.parent()?.to_path_buf();
    Some(RelinkAction {
        source: member.path.clone(),
        canonical: canonical.path.clone(),
        destination_dir,
        destination,
        size: member.size,
    })
}

/// Counters from planning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanStats {
    /// Groups considered
    pub groups: usize,
    /// Groups with no member matching the priority pattern
    pub groups_without_canonical: usize,
    /// Actions produced
    pub actions: usize,
    /// Members on the canonical's own volume, left alone
    pub same_volume: usize,
    /// Members matching the priority pattern, left alone
    pub protected: usize,
    /// Members already sharing the canonical's inode
    pub already_linked: usize,
    /// Members that could not be mapped below their volume root
    pub unclassified: usize,
}

/// Builds relink actions from resolved groups.
pub struct RelinkPlanner {
    pattern: PriorityPattern,
    skip_shared_inodes: bool,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for RelinkPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelinkPlanner")
            .field("pattern", &self.pattern.as_str())
            .field("skip_shared_inodes", &self.skip_shared_inodes)
            .finish_non_exhaustive()
    }
}

impl RelinkPlanner {
    /// Create a planner protecting members that match `pattern`.
    #[must_use]
    pub fn new(pattern: PriorityPattern) -> Self {
        Self {
            pattern,
            skip_shared_inodes: true,
            event_sink: Arc::new(NullSink),
        }
    }

    /// Whether members already hardlinked to the canonical are skipped.
    #[must_use]
    pub fn with_skip_shared_inodes(mut self, skip: bool) -> Self {
        self.skip_shared_inodes = skip;
        self
    }

    /// Set the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    fn not_planned(&self, member: &FileRecord, canonical: &FileRecord, reason: NotPlannedReason) {
        self.event_sink.emit(&RunEvent::MemberNotPlanned {
            path: member.path.clone(),
            canonical: canonical.path.clone(),
            reason,
        });
    }

    /// Plan one group. Groups without a canonical file yield no actions.
    pub fn plan_group(&self, resolved: &ResolvedGroup, stats: &mut PlanStats) -> Vec<RelinkAction> {
        stats.groups += 1;
        let Some(canonical) = resolved.canonical() else {
            stats.groups_without_canonical += 1;
            return Vec::new();
        };

        let mut actions = Vec::new();
        for member in resolved.others() {
            if member.volume == canonical.volume {
                stats.same_volume += 1;
                self.not_planned(member, canonical, NotPlannedReason::SameVolume);
                continue;
            }
            if self.pattern.matches_record(member) {
                stats.protected += 1;
                self.event_sink.emit(&RunEvent::MemberProtected {
                    path: member.path.clone(),
                    canonical: canonical.path.clone(),
                });
                continue;
            }
            if self.skip_shared_inodes
                && member.identity.is_some()
                && member.identity == canonical.identity
            {
                stats.already_linked += 1;
                self.not_planned(member, canonical, NotPlannedReason::AlreadyLinked);
                continue;
            }
            let Some(action) = action_for(member, canonical) else {
                stats.unclassified += 1;
                self.not_planned(member, canonical, NotPlannedReason::Unclassified);
                continue;
            };
            self.event_sink.emit(&RunEvent::ActionPlanned {
                action: action.clone(),
            });
            actions.push(action);
        }
        stats.actions += actions.len();
        actions
    }

    /// Plan every group, in group order.
    #[must_use]
    pub fn plan(&self, groups: &[ResolvedGroup]) -> (Vec<RelinkAction>, PlanStats) {
        let mut stats = PlanStats::default();
        let actions = groups
            .iter()
            .flat_map(|group| self.plan_group(group, &mut stats))
            .collect();
        log::info!(
            "Planned {} relink action(s) from {} group(s) ({} protected, {} without canonical)",
            stats.actions,
            stats.groups,
            stats.protected,
            stats.groups_without_canonical
        );
        (actions, stats)
    }
}
