//! Basename grouping, size splitting and content groups.
//!
//! # Overview
//!
//! Phase 1 groups every enumerated file by its NFC-normalized basename and
//! keeps only groups whose members live on two or more volumes. No file is
//! read. A file whose name appears on a single volume can never take part in
//! a cross-volume relink, so it is dropped here.
//!
//! Renamed duplicates (same content, different basename) are invisible to
//! this engine by construction.
//!
//! Within each surviving name group, members are then split by size: files
//! of different sizes cannot share a digest, and a size subgroup confined to
//! one volume is dropped before anything is hashed.
//!
//! # Example
//!
//! ```
//! use crosslink::duplicates::group_by_name;
//! use crosslink::scanner::{FileRecord, VolumeId};
//! use std::path::PathBuf;
//!
//! let v1 = VolumeId::new("/v1");
//! let v2 = VolumeId::new("/v2");
//! let files = vec![
//!     FileRecord::new(PathBuf::from("/v1/movies/x.mkv"), v1.clone(), 10).unwrap(),
//!     FileRecord::new(PathBuf::from("/v2/torrents/x.mkv"), v2, 10).unwrap(),
//!     FileRecord::new(PathBuf::from("/v1/only/y.mkv"), v1, 10).unwrap(),
//! ];
//!
//! let (groups, stats) = group_by_name(files);
//! assert_eq!(groups.len(), 1);
//! assert_eq!(groups[0].basename, "x.mkv");
//! assert_eq!(stats.eliminated_single_volume, 1);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use serde::{Serialize, Serializer};

use crate::scanner::identity::HardlinkTracker;
use crate::scanner::{hash_to_hex, FileRecord, Hash, VolumeId};

/// Files sharing a basename, with the set of volumes they were seen on.
#[derive(Debug, Clone)]
pub struct NameGroup {
    /// NFC-normalized basename shared by all members
    pub basename: String,
    /// Members in enumeration order
    pub files: Vec<FileRecord>,
    /// Distinct volumes among the members
    pub volumes: BTreeSet<VolumeId>,
}

impl NameGroup {
    /// Create an empty group for `basename`.
    #[must_use]
    pub fn new(basename: impl Into<String>) -> Self {
        Self {
            basename: basename.into(),
            files: Vec::new(),
            volumes: BTreeSet::new(),
        }
    }

    /// Add a member.
    pub fn add(&mut self, file: FileRecord) {
        debug_assert_eq!(file.basename, self.basename);
        self.volumes.insert(file.volume.clone());
        self.files.push(file);
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of distinct volumes among the members.
    #[must_use]
    pub fn volume_count(&self) -> usize {
        self.volumes.len()
    }

    /// Whether members live on at least two volumes.
    #[must_use]
    pub fn spans_volumes(&self) -> bool {
        self.volumes.len() >= 2
    }

    /// Split into per-size subgroups, keeping those that still span volumes.
    ///
    /// Subgroups are returned in ascending size order.
    #[must_use]
    pub fn split_by_size(self) -> Vec<NameGroup> {
        let mut by_size: BTreeMap<u64, NameGroup> = BTreeMap::new();
        for file in self.files {
            by_size
                .entry(file.size)
                .or_insert_with(|| NameGroup::new(self.basename.clone()))
                .add(file);
        }
        by_size
            .into_iter()
            .filter_map(|(size, group)| {
                if group.spans_volumes() {
                    Some(group)
                } else {
                    log::trace!(
                        "Size split dropped '{}' ({} bytes): single volume",
                        group.basename,
                        size
                    );
                    None
                }
            })
            .collect()
    }
}

/// Statistics from the basename grouping phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NameGroupingStats {
    /// Total number of files considered
    pub total_files: usize,
    /// Number of distinct basenames
    pub unique_names: usize,
    /// Files dropped because their basename lives on one volume only
    pub eliminated_single_volume: usize,
    /// Files dropped by the size split
    pub eliminated_by_size: usize,
    /// Name groups (after size split) forwarded to hashing
    pub candidate_groups: usize,
    /// Files forwarded to hashing
    pub candidate_files: usize,
}

impl NameGroupingStats {
    /// Percentage of files eliminated without hashing.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            ((self.total_files - self.candidate_files) as f64 / self.total_files as f64) * 100.0
        }
    }
}

/// Group files by basename (Phase 1).
///
/// Returns only groups spanning two or more volumes, sorted by basename.
/// An input where no basename spans volumes yields an empty result.
#[must_use]
pub fn group_by_name(
    files: impl IntoIterator<Item = FileRecord>,
) -> (Vec<NameGroup>, NameGroupingStats) {
    let mut all_groups: HashMap<String, NameGroup> = HashMap::new();
    let mut stats = NameGroupingStats::default();

    for file in files {
        stats.total_files += 1;
        all_groups
            .entry(file.basename.clone())
            .or_insert_with(|| NameGroup::new(file.basename.clone()))
            .add(file);
    }

    stats.unique_names = all_groups.len();

    let mut groups: Vec<NameGroup> = all_groups
        .into_values()
        .filter(|group| {
            if group.spans_volumes() {
                log::trace!(
                    "Name group '{}': {} files on {} volumes",
                    group.basename,
                    group.len(),
                    group.volume_count()
                );
                true
            } else {
                stats.eliminated_single_volume += group.len();
                false
            }
        })
        .collect();
    groups.sort_by(|a, b| a.basename.cmp(&b.basename));

    stats.candidate_groups = groups.len();
    stats.candidate_files = groups.iter().map(NameGroup::len).sum();

    log::info!(
        "Phase 1 complete: {} files -> {} cross-volume name candidates",
        stats.total_files,
        stats.candidate_files
    );

    (groups, stats)
}

/// Apply [`NameGroup::split_by_size`] to every group and update `stats`.
#[must_use]
pub fn split_by_size(groups: Vec<NameGroup>, stats: &mut NameGroupingStats) -> Vec<NameGroup> {
    let before: usize = groups.iter().map(NameGroup::len).sum();
    let split: Vec<NameGroup> = groups
        .into_iter()
        .flat_map(NameGroup::split_by_size)
        .collect();
    let after: usize = split.iter().map(NameGroup::len).sum();

    stats.eliminated_by_size = before - after;
    stats.candidate_groups = split.len();
    stats.candidate_files = after;

    if stats.eliminated_by_size > 0 {
        log::debug!(
            "Size split dropped {} candidate(s) confined to one volume",
            stats.eliminated_by_size
        );
    }
    split
}

/// Flatten name groups into the candidate list for hashing.
#[must_use]
pub fn candidates(groups: Vec<NameGroup>) -> Vec<FileRecord> {
    groups.into_iter().flat_map(|g| g.files).collect()
}

fn serialize_digest<S: Serializer>(digest: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hash_to_hex(digest))
}

/// Files sharing a content digest (Phase 2 result).
#[derive(Debug, Clone, Serialize)]
pub struct ContentGroup {
    /// BLAKE3 digest shared by all members
    #[serde(serialize_with = "serialize_digest")]
    pub digest: Hash,
    /// Size of each member in bytes
    pub size: u64,
    /// Members in lexicographic path order
    pub members: Vec<FileRecord>,
}

impl ContentGroup {
    /// Create a group, pinning member order to lexicographic path order.
    #[must_use]
    pub fn new(digest: Hash, mut members: Vec<FileRecord>) -> Self {
        members.sort_by(|a, b| a.path.cmp(&b.path));
        let size = members.first().map_or(0, |f| f.size);
        Self {
            digest,
            size,
            members,
        }
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Distinct volumes, recomputed from the members.
    #[must_use]
    pub fn volumes(&self) -> BTreeSet<&VolumeId> {
        self.members.iter().map(|m| &m.volume).collect()
    }

    /// Number of distinct volumes among the members.
    #[must_use]
    pub fn volume_count(&self) -> usize {
        self.volumes().len()
    }

    /// Whether members live on at least two volumes.
    #[must_use]
    pub fn spans_volumes(&self) -> bool {
        self.volume_count() >= 2
    }

    /// Members that are hardlinks of an earlier member (same device/inode).
    #[must_use]
    pub fn alias_count(&self) -> usize {
        let mut tracker = HardlinkTracker::new();
        self.members
            .iter()
            .filter(|m| tracker.is_alias(m.identity))
            .count()
    }

    /// Copies of the data beyond the first, not counting hardlink aliases.
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.members
            .len()
            .saturating_sub(self.alias_count())
            .saturating_sub(1)
    }

    /// Digest as a hexadecimal string.
    #[must_use]
    pub fn digest_hex(&self) -> String {
        hash_to_hex(&self.digest)
    }

    /// Member paths in order.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.members.iter().map(|m| m.path.clone()).collect()
    }
}
