//! Duplicate finder: content hashing phase and pipeline orchestration.
//!
//! # Overview
//!
//! The finder runs the discovery half of a run:
//! 1. **Walk** - enumerate regular files on every volume, pruning exclusions
//! 2. **Phase 1** - group by basename, keep groups spanning 2+ volumes
//! 3. **Size split** - drop same-name subgroups confined to one volume
//! 4. **Phase 2** - hash the survivors in parallel, group by digest, keep
//!    digest groups that still span 2+ volumes
//!
//! Phase 1's volume spread does not survive Phase 2 automatically: two
//! same-named files with different content land in different digest groups
//! with one volume each, so the volume count is recomputed after hashing.
//!
//! # Example
//!
//! ```no_run
//! use crosslink::duplicates::{DuplicateFinder, FinderConfig};
//! use crosslink::scanner::VolumeSet;
//! use std::path::PathBuf;
//!
//! let volumes = VolumeSet::resolve(
//!     &[PathBuf::from("/mnt/disk1"), PathBuf::from("/mnt/disk2")],
//!     &[],
//! ).unwrap();
//! let finder = DuplicateFinder::new(FinderConfig::default().with_io_threads(4));
//! let (groups, summary) = finder.find_duplicates(&volumes).unwrap();
//! println!("{} cross-volume groups, {} reclaimable", groups.len(), summary.reclaimable_display());
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;

use super::groups::{candidates, group_by_name, split_by_size, NameGroupingStats};
use super::ContentGroup;
use crate::events::{EventSink, NullSink, RunEvent};
use crate::progress::ProgressCallback;
use crate::scanner::volume::resolve_exclusions;
use crate::scanner::{
    ContentHasher, ExclusionRule, FileRecord, Hash, HashError, Hasher, VolumeSet, Walker,
    WalkerConfig,
};

/// Configuration for the content hashing phase.
#[derive(Clone)]
pub struct ContentConfig {
    /// Number of worker threads hashing concurrently.
    pub io_threads: usize,
    /// Shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
    /// Receiver of `HashFailed` and `GroupDiscovered` events.
    pub event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ContentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentConfig")
            .field("io_threads", &self.io_threads)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish_non_exhaustive()
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            io_threads: 4,
            shutdown_flag: None,
            progress_callback: None,
            event_sink: Arc::new(NullSink),
        }
    }
}

impl ContentConfig {
    /// Set the number of hashing threads (minimum 1).
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
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

    /// Set the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Statistics from the content hashing phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentStats {
    /// Candidates handed to the phase
    pub input_files: usize,
    /// Files hashed successfully
    pub hashed_files: usize,
    /// Files dropped because hashing failed
    pub failed_files: usize,
    /// Bytes read while hashing
    pub bytes_hashed: u64,
    /// Digest groups dropped because they were confined to one volume
    pub single_volume_groups: usize,
    /// Digest groups spanning 2+ volumes
    pub cross_volume_groups: usize,
    /// Copies beyond the first across all forwarded groups
    pub duplicate_files: usize,
    /// Bytes held by those copies
    pub reclaimable_space: u64,
    /// Whether hashing stopped early
    pub interrupted: bool,
}

/// Hash candidates and group them by digest (Phase 2).
///
/// A failure to hash one file removes only that file and is reported as a
/// [`RunEvent::HashFailed`]; the phase continues. All digests are collected
/// before grouping, so completion order has no effect on the result.
/// Returned groups are sorted by their first member path.
#[must_use]
pub fn group_by_content(
    candidates: Vec<FileRecord>,
    hasher: Arc<dyn ContentHasher>,
    config: &ContentConfig,
) -> (Vec<ContentGroup>, ContentStats) {
    let mut stats = ContentStats {
        input_files: candidates.len(),
        ..Default::default()
    };

    if candidates.is_empty() {
        log::debug!("Phase 2: No candidates to hash");
        return (Vec::new(), stats);
    }

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_start("hashing", candidates.len());
    }

    log::info!("Phase 2: Hashing {} candidates", candidates.len());

    let completed = AtomicUsize::new(0);
    let hash_one = |file: FileRecord| -> (FileRecord, Result<Hash, HashError>) {
        if config.is_shutdown_requested() {
            let path = file.path.clone();
            return (file, Err(HashError::Interrupted(path)));
        }
        let result = hasher.digest(&file.path);
        if let Some(ref callback) = config.progress_callback {
            let current = completed.fetch_add(1, Ordering::Relaxed) + 1;
            callback.on_progress(current, &file.path.to_string_lossy());
            callback.on_item_completed(file.size);
        }
        (file, result)
    };

    let results: Vec<(FileRecord, Result<Hash, HashError>)> =
        match rayon::ThreadPoolBuilder::new()
            .num_threads(config.io_threads.max(1))
            .build()
        {
            Ok(pool) => pool.install(|| candidates.into_par_iter().map(hash_one).collect()),
            Err(e) => {
                log::warn!(
                    "Failed to create hashing pool ({}), using global pool with {} threads",
                    e,
                    rayon::current_num_threads()
                );
                candidates.into_par_iter().map(hash_one).collect()
            }
        };

    let mut by_digest: HashMap<Hash, Vec<FileRecord>> = HashMap::new();
    for (file, result) in results {
        match result {
            Ok(digest) => {
                stats.hashed_files += 1;
                stats.bytes_hashed += file.size;
                by_digest.entry(digest).or_default().push(file);
            }
            Err(HashError::Interrupted(_)) => {
                stats.interrupted = true;
            }
            Err(e) => {
                stats.failed_files += 1;
                config.event_sink.emit(&RunEvent::HashFailed {
                    path: file.path,
                    reason: e.to_string(),
                });
            }
        }
    }

    if stats.interrupted {
        log::info!("Phase 2: Interrupted by shutdown signal");
    }

    let mut groups: Vec<ContentGroup> = by_digest
        .into_iter()
        .map(|(digest, members)| ContentGroup::new(digest, members))
        .filter(|group| {
            if group.spans_volumes() {
                true
            } else {
                stats.single_volume_groups += 1;
                log::trace!(
                    "Digest group {} dropped: {} file(s) on one volume",
                    group.digest_hex(),
                    group.len()
                );
                false
            }
        })
        .collect();
    groups.sort_by(|a, b| a.members[0].path.cmp(&b.members[0].path));

    for group in &groups {
        stats.cross_volume_groups += 1;
        stats.duplicate_files += group.duplicate_count();
        stats.reclaimable_space += group.size * group.duplicate_count() as u64;
        config.event_sink.emit(&RunEvent::GroupDiscovered {
            digest: group.digest_hex(),
            size: group.size,
            members: group.paths(),
            volumes: group.volume_count(),
        });
    }

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_end("hashing");
    }

    log::info!(
        "Phase 2 complete: {} hashed, {} failed, {} cross-volume groups",
        stats.hashed_files,
        stats.failed_files,
        stats.cross_volume_groups
    );

    (groups, stats)
}

// ============================================================================
// DuplicateFinder - Pipeline Orchestrator
// ============================================================================

/// Configuration for the duplicate finder.
#[derive(Clone)]
pub struct FinderConfig {
    /// Number of I/O threads for parallel hashing.
    pub io_threads: usize,
    /// Walker configuration (hidden files, minimum size).
    pub walker_config: WalkerConfig,
    /// Exclusion patterns, resolved per volume at scan time.
    pub exclusions: Vec<ExclusionRule>,
    /// Shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
    /// Receiver of discovery events.
    pub event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for FinderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinderConfig")
            .field("io_threads", &self.io_threads)
            .field("walker_config", &self.walker_config)
            .field("exclusions", &self.exclusions)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish_non_exhaustive()
    }
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            io_threads: 4,
            walker_config: WalkerConfig::default(),
            exclusions: Vec::new(),
            shutdown_flag: None,
            progress_callback: None,
            event_sink: Arc::new(NullSink),
        }
    }
}

impl FinderConfig {
    /// Set the number of I/O threads (minimum 1).
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the walker configuration.
    #[must_use]
    pub fn with_walker_config(mut self, config: WalkerConfig) -> Self {
        self.walker_config = config;
        self
    }

    /// Set the exclusion patterns.
    #[must_use]
    pub fn with_exclusions(mut self, exclusions: Vec<ExclusionRule>) -> Self {
        self.exclusions = exclusions;
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

    /// Set the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn content_config(&self) -> ContentConfig {
        ContentConfig {
            io_threads: self.io_threads,
            shutdown_flag: self.shutdown_flag.clone(),
            progress_callback: self.progress_callback.clone(),
            event_sink: Arc::clone(&self.event_sink),
        }
    }
}

/// Summary statistics for the discovery half of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    /// Number of volumes scanned
    pub volumes: usize,
    /// Number of excluded directories that resolved on some volume
    pub excluded_dirs: usize,
    /// Total number of files enumerated
    pub total_files: usize,
    /// Total size of all enumerated files in bytes
    pub total_size: u64,
    /// Subtrees or files that could not be enumerated
    pub scan_errors: usize,
    /// Phase 1 and size split statistics
    pub names: NameGroupingStats,
    /// Phase 2 statistics
    pub content: ContentStats,
    /// Confirmed cross-volume duplicate groups
    pub duplicate_groups: usize,
    /// Copies beyond the first (hardlink aliases not counted)
    pub duplicate_files: usize,
    /// Bytes held by those copies
    pub reclaimable_space: u64,
    /// Duration of the discovery phases
    #[serde(skip)]
    pub scan_duration: Duration,
    /// Whether discovery was interrupted
    pub interrupted: bool,
}

impl ScanSummary {
    /// Percentage of scanned bytes held by duplicate copies.
    #[must_use]
    pub fn wasted_percentage(&self) -> f64 {
        if self.total_size == 0 {
            0.0
        } else {
            (self.reclaimable_space as f64 / self.total_size as f64) * 100.0
        }
    }

    /// Reclaimable space as a human-readable string.
    #[must_use]
    pub fn reclaimable_display(&self) -> String {
        bytesize::ByteSize::b(self.reclaimable_space).to_string()
    }

    /// Total size as a human-readable string.
    #[must_use]
    pub fn total_size_display(&self) -> String {
        bytesize::ByteSize::b(self.total_size).to_string()
    }
}

/// Errors that can occur during duplicate finding.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// No volumes to scan.
    #[error("No volumes to scan")]
    NoVolumes,
}

/// Duplicate finder that orchestrates walking, Phase 1 and Phase 2.
pub struct DuplicateFinder {
    config: FinderConfig,
    hasher: Arc<dyn ContentHasher>,
}

impl DuplicateFinder {
    /// Create a finder backed by the BLAKE3 [`Hasher`].
    #[must_use]
    pub fn new(config: FinderConfig) -> Self {
        let mut hasher = Hasher::new();
        if let Some(ref flag) = config.shutdown_flag {
            hasher = hasher.with_shutdown_flag(Arc::clone(flag));
        }
        Self {
            config,
            hasher: Arc::new(hasher),
        }
    }

    /// Create a finder with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(FinderConfig::default())
    }

    /// Replace the content hasher.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Find cross-volume duplicate groups on `volumes`.
    ///
    /// Enumeration errors are reported as [`RunEvent::ScanError`] and counted;
    /// they never abort the scan.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::NoVolumes`] for an empty set. A shutdown
    /// request is not an error: the summary comes back with `interrupted`
    /// set and no groups, so nothing half-discovered is ever acted on.
    pub fn find_duplicates(
        &self,
        volumes: &VolumeSet,
    ) -> Result<(Vec<ContentGroup>, ScanSummary), FinderError> {
        if volumes.is_empty() {
            return Err(FinderError::NoVolumes);
        }

        let start_time = Instant::now();
        log::info!("Starting duplicate scan of {} volume(s)", volumes.len());

        let excluded = resolve_exclusions(&self.config.exclusions, volumes);
        let excluded_dirs = excluded.len();

        let mut walker = Walker::new(volumes, excluded, self.config.walker_config.clone());
        if let Some(ref flag) = self.config.shutdown_flag {
            walker = walker.with_shutdown_flag(Arc::clone(flag));
        }
        if let Some(ref callback) = self.config.progress_callback {
            walker = walker.with_progress_callback(Arc::clone(callback));
            callback.on_phase_start("scanning", 0);
        }

        let mut records = Vec::new();
        let mut scan_errors = 0usize;
        for entry in walker.walk() {
            match entry {
                Ok(record) => records.push(record),
                Err(e) => {
                    scan_errors += 1;
                    self.config.event_sink.emit(&RunEvent::ScanError {
                        path: e.path().to_path_buf(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end("scanning");
        }

        if self.config.is_shutdown_requested() {
            log::info!("Scan interrupted during walk");
            let summary = ScanSummary {
                volumes: volumes.len(),
                excluded_dirs,
                total_files: records.len(),
                total_size: records.iter().map(|r| r.size).sum(),
                scan_errors,
                scan_duration: start_time.elapsed(),
                interrupted: true,
                ..Default::default()
            };
            return Ok((Vec::new(), summary));
        }

        log::info!(
            "Found {} files on {} volume(s) ({} scan errors)",
            records.len(),
            volumes.len(),
            scan_errors
        );

        let (groups, mut summary) = self.find_duplicates_from_records(records);
        summary.volumes = volumes.len();
        summary.excluded_dirs = excluded_dirs;
        summary.scan_errors = scan_errors;
        summary.scan_duration = start_time.elapsed();
        Ok((groups, summary))
    }

    /// Run Phase 1 and Phase 2 over already-enumerated records.
    ///
    /// On shutdown the summary has `interrupted` set and no groups are
    /// returned.
    #[must_use]
    pub fn find_duplicates_from_records(
        &self,
        records: Vec<FileRecord>,
    ) -> (Vec<ContentGroup>, ScanSummary) {
        let start_time = Instant::now();
        let mut summary = ScanSummary {
            total_files: records.len(),
            total_size: records.iter().map(|r| r.size).sum(),
            ..Default::default()
        };

        log::info!("Phase 1: Grouping by name across volumes...");
        let (name_groups, mut name_stats) = group_by_name(records);
        let name_groups = split_by_size(name_groups, &mut name_stats);
        let to_hash = candidates(name_groups);
        log::info!(
            "Phase 1 kept {} of {} file(s) ({:.1}% eliminated without hashing)",
            name_stats.candidate_files,
            name_stats.total_files,
            name_stats.elimination_rate()
        );
        summary.names = name_stats;

        if to_hash.is_empty() {
            log::info!("No cross-volume candidates after Phase 1, nothing to hash");
            summary.scan_duration = start_time.elapsed();
            return (Vec::new(), summary);
        }

        if self.config.is_shutdown_requested() {
            summary.interrupted = true;
            return (Vec::new(), summary);
        }

        let (groups, content_stats) = group_by_content(
            to_hash,
            Arc::clone(&self.hasher),
            &self.config.content_config(),
        );

        if content_stats.interrupted {
            summary.content = content_stats;
            summary.interrupted = true;
            summary.scan_duration = start_time.elapsed();
            return (Vec::new(), summary);
        }

        summary.duplicate_groups = groups.len();
        summary.duplicate_files = content_stats.duplicate_files;
        summary.reclaimable_space = content_stats.reclaimable_space;
        summary.content = content_stats;
        summary.scan_duration = start_time.elapsed();

        log::info!(
            "Discovery complete: {} cross-volume groups, {} duplicate copies, {} reclaimable ({:.1}%)",
            summary.duplicate_groups,
            summary.duplicate_files,
            summary.reclaimable_display(),
            summary.wasted_percentage()
        );

        (groups, summary)
    }
}
