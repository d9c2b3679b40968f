//! Multi-volume directory walker using jwalk for parallel traversal.
//!
//! # Overview
//!
//! The [`Walker`] enumerates every regular file under each configured volume
//! root and yields it as a classified [`FileRecord`]. It is lazy and can be
//! restarted by calling [`Walker::walk`] again.
//!
//! # Features
//!
//! - Parallel directory reading per volume (rayon-backed jwalk)
//! - Excluded directories are pruned before descent, and only by the walk
//!   of the volume that owns them
//! - Roots of nested volumes are pruned from their parent volume's walk
//! - Symlinks are never followed and never yielded
//! - Per-entry errors are yielded as [`ScanError`] values; the walk goes on
//! - Graceful shutdown via atomic flag
//!
//! # Example
//!
//! ```no_run
//! use crosslink::scanner::{VolumeSet, Walker, WalkerConfig};
//! use std::path::PathBuf;
//!
//! let volumes = VolumeSet::resolve(&[PathBuf::from("/mnt/disk1")], &[]).unwrap();
//! let walker = Walker::new(&volumes, vec![PathBuf::from("/mnt/disk1/appdata")], WalkerConfig::default());
//! let records: Vec<_> = walker.walk().filter_map(Result::ok).collect();
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use jwalk::WalkDir;

use super::identity::FileIdentity;
use super::{FileRecord, ScanError, VolumeId, VolumeSet, WalkerConfig};
use crate::progress::ProgressCallback;

/// Directory walker across all volumes of a run.
pub struct Walker {
    volumes: VolumeSet,
    excluded: Arc<Vec<PathBuf>>,
    config: WalkerConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
    progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for Walker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Walker")
            .field("volumes", &self.volumes)
            .field("excluded", &self.excluded)
            .field("config", &self.config)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Walker {
    /// Create a walker over `volumes`, pruning the resolved `excluded` directories.
    #[must_use]
    pub fn new(volumes: &VolumeSet, excluded: Vec<PathBuf>, config: WalkerConfig) -> Self {
        Self {
            volumes: volumes.clone(),
            excluded: Arc::new(excluded),
            config,
            shutdown_flag: None,
            progress_callback: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback; `on_progress` fires for each yielded file.
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

    /// Walk every volume in configured order, yielding classified records.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileRecord, ScanError>> + '_ {
        let mut yielded = 0usize;
        self.volumes
            .iter()
            .flat_map(move |volume| self.walk_volume(volume))
            .inspect(move |result| {
                if let (Ok(record), Some(callback)) = (result, &self.progress_callback) {
                    yielded += 1;
                    callback.on_progress(yielded, &record.path.to_string_lossy());
                }
            })
    }

    fn walk_volume(
        &self,
        volume: VolumeId,
    ) -> impl Iterator<Item = Result<FileRecord, ScanError>> + '_ {
        let root = volume.root().to_path_buf();
        log::debug!("Walking volume {}", root.display());

        let mut pruned: Vec<PathBuf> = self
            .excluded
            .iter()
            .filter(|dir| self.volumes.classify(dir).as_ref() == Some(&volume))
            .cloned()
            .collect();
        pruned.extend(self.volumes.nested_roots(&root));
        let pruned = Arc::new(pruned);

        let walk_dir = WalkDir::new(&root)
            .follow_links(false)
            .skip_hidden(self.config.skip_hidden)
            .process_read_dir(move |_depth, _path, _read_dir_state, children| {
                children.retain(|child| match child {
                    Ok(entry) => {
                        if !entry.file_type().is_dir() {
                            return true;
                        }
                        let path = entry.path();
                        let keep = !pruned.iter().any(|p| p == &path);
                        if !keep {
                            log::debug!("Pruning excluded directory {}", path.display());
                        }
                        keep
                    }
                    Err(_) => true,
                });
                // Sort children for deterministic output
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });
            });

        walk_dir.into_iter().filter_map(move |entry_result| {
            if self.is_shutdown_requested() {
                log::debug!("Walker: Shutdown requested, stopping iteration");
                return None;
            }

            match entry_result {
                Ok(entry) => {
                    let file_type = entry.file_type();
                    if file_type.is_dir() {
                        return None;
                    }
                    let path = entry.path();
                    if file_type.is_symlink() {
                        log::trace!("Skipping symlink: {}", path.display());
                        return None;
                    }
                    self.process_file(path, &volume)
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| root.clone(), std::borrow::ToOwned::to_owned);
                    log::warn!("Walker error for {}: {}", path.display(), e);
                    let error = match e.io_error() {
                        Some(io) => std::io::Error::new(io.kind(), io.to_string()),
                        None => std::io::Error::other(e.to_string()),
                    };
                    Some(Err(ScanError::from_io(&path, error)))
                }
            }
        })
    }

    /// Stat a file and turn it into a record, applying size filters.
    fn process_file(
        &self,
        path: PathBuf,
        volume: &VolumeId,
    ) -> Option<Result<FileRecord, ScanError>> {
        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(e) => return Some(Err(self.handle_io_error(&path, e))),
        };

        if !metadata.is_file() {
            return None;
        }

        let size = metadata.len();
        if size < self.config.min_size {
            log::trace!("Skipping small file ({} bytes): {}", size, path.display());
            return None;
        }

        // The walk root is the volume root, so classification must agree;
        // anything else is dropped rather than assigned a volume.
        if self.volumes.classify(&path).as_ref() != Some(volume) {
            log::warn!(
                "Skipping {}: not classifiable to volume {}",
                path.display(),
                volume
            );
            return None;
        }

        FileRecord::new(path, volume.clone(), size)
            .map(|record| Ok(record.with_identity(FileIdentity::from_metadata(&metadata))))
    }

    fn handle_io_error(&self, path: &Path, error: std::io::Error) -> ScanError {
        match error.kind() {
            std::io::ErrorKind::NotFound => {
                log::debug!("File not found (may have been deleted): {}", path.display());
            }
            _ => log::warn!("Cannot stat {}: {}", path.display(), error),
        }
        ScanError::from_io(path, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _base: TempDir,
        volumes: VolumeSet,
    }

    impl Fixture {
        fn new(names: &[&str]) -> Self {
            let base = TempDir::new().unwrap();
            let roots: Vec<PathBuf> = names
                .iter()
                .map(|n| {
                    let p = base.path().join(n);
                    fs::create_dir_all(&p).unwrap();
                    p
                })
                .collect();
            let volumes = VolumeSet::resolve(&roots, &[]).unwrap();
            Self {
                _base: base,
                volumes,
            }
        }

        fn root(&self, i: usize) -> &Path {
            &self.volumes.roots()[i]
        }

        fn write(&self, volume: usize, rel: &str, content: &[u8]) -> PathBuf {
            let path = self.root(volume).join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            path
        }
    }

    fn walk_paths(walker: &Walker) -> Vec<PathBuf> {
        walker.walk().filter_map(Result::ok).map(|r| r.path).collect()
    }

    #[test]
    fn test_walker_finds_files_on_all_volumes() {
        let fx = Fixture::new(&["disk1", "disk2"]);
        let a = fx.write(0, "movies/x.mkv", b"data");
        let b = fx.write(1, "torrents/x.mkv", b"data");

        let walker = Walker::new(&fx.volumes, Vec::new(), WalkerConfig::default());
        let records: Vec<_> = walker.walk().filter_map(Result::ok).collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].path, a);
        assert_eq!(records[0].volume.root(), fx.root(0));
        assert_eq!(records[1].path, b);
        assert_eq!(records[1].volume.root(), fx.root(1));
        assert!(records.iter().all(|r| r.basename == "x.mkv"));
    }

    #[test]
    fn test_walker_prunes_excluded_directories() {
        let fx = Fixture::new(&["disk1"]);
        fx.write(0, "keep/a.txt", b"a");
        fx.write(0, "appdata/b.txt", b"b");
        fx.write(0, "appdata/deep/c.txt", b"c");

        let excluded = vec![fx.root(0).join("appdata")];
        let walker = Walker::new(&fx.volumes, excluded, WalkerConfig::default());
        let paths = walk_paths(&walker);

        assert_eq!(paths, vec![fx.root(0).join("keep/a.txt")]);
    }

    #[test]
    fn test_walker_exclusion_is_per_volume() {
        let fx = Fixture::new(&["disk1", "disk2"]);
        fx.write(0, "appdata/a.txt", b"a");
        let kept = fx.write(1, "appdata/a.txt", b"a");

        let excluded = vec![fx.root(0).join("appdata")];
        let walker = Walker::new(&fx.volumes, excluded, WalkerConfig::default());

        assert_eq!(walk_paths(&walker), vec![kept]);
    }

    #[test]
    fn test_walker_skips_empty_files_by_default() {
        let fx = Fixture::new(&["disk1"]);
        fx.write(0, "empty.txt", b"");
        let full = fx.write(0, "full.txt", b"x");

        let walker = Walker::new(&fx.volumes, Vec::new(), WalkerConfig::default());
        assert_eq!(walk_paths(&walker), vec![full]);
    }

    #[test]
    fn test_walker_min_size() {
        let fx = Fixture::new(&["disk1"]);
        fx.write(0, "small.txt", b"abc");
        let big = fx.write(0, "big.txt", &[1u8; 100]);

        let config = WalkerConfig::default().with_min_size(10);
        let walker = Walker::new(&fx.volumes, Vec::new(), config);
        assert_eq!(walk_paths(&walker), vec![big]);
    }

    #[test]
    fn test_walker_nested_volume_not_walked_twice() {
        let fx = Fixture::new(&["outer", "outer/inner"]);
        let a = fx.write(0, "a.txt", b"a");
        let b = fx.write(1, "b.txt", b"b");

        let walker = Walker::new(&fx.volumes, Vec::new(), WalkerConfig::default());
        let records: Vec<_> = walker.walk().filter_map(Result::ok).collect();

        assert_eq!(records.len(), 2);
        let inner = records.iter().find(|r| r.path == b).unwrap();
        assert_eq!(inner.volume.root(), fx.root(1));
        let outer = records.iter().find(|r| r.path == a).unwrap();
        assert_eq!(outer.volume.root(), fx.root(0));
    }

    #[test]
    #[cfg(unix)]
    fn test_walker_skips_symlinks() {
        let fx = Fixture::new(&["disk1"]);
        let target = fx.write(0, "real.txt", b"real");
        std::os::unix::fs::symlink(&target, fx.root(0).join("link.txt")).unwrap();

        let walker = Walker::new(&fx.volumes, Vec::new(), WalkerConfig::default());
        assert_eq!(walk_paths(&walker), vec![target]);
    }

    #[test]
    #[cfg(unix)]
    fn test_walker_records_identity() {
        let fx = Fixture::new(&["disk1"]);
        let a = fx.write(0, "a.txt", b"same");
        fs::hard_link(&a, fx.root(0).join("b.txt")).unwrap();

        let walker = Walker::new(&fx.volumes, Vec::new(), WalkerConfig::default());
        let records: Vec<_> = walker.walk().filter_map(Result::ok).collect();

        assert_eq!(records.len(), 2);
        assert!(records[0].identity.is_some());
        assert_eq!(records[0].identity, records[1].identity);
    }

    #[test]
    fn test_walker_skip_hidden() {
        let fx = Fixture::new(&["disk1"]);
        fx.write(0, ".hidden/a.txt", b"a");
        let visible = fx.write(0, "visible.txt", b"v");

        let config = WalkerConfig::default().with_skip_hidden(true);
        let walker = Walker::new(&fx.volumes, Vec::new(), config);
        assert_eq!(walk_paths(&walker), vec![visible]);
    }

    #[test]
    fn test_walker_shutdown_flag() {
        let fx = Fixture::new(&["disk1"]);
        fx.write(0, "a.txt", b"a");

        let flag = Arc::new(AtomicBool::new(true));
        let walker =
            Walker::new(&fx.volumes, Vec::new(), WalkerConfig::default()).with_shutdown_flag(flag);
        assert!(walk_paths(&walker).is_empty());
    }

    #[test]
    fn test_walker_is_restartable() {
        let fx = Fixture::new(&["disk1"]);
        fx.write(0, "a.txt", b"a");

        let walker = Walker::new(&fx.volumes, Vec::new(), WalkerConfig::default());
        assert_eq!(walk_paths(&walker), walk_paths(&walker));
    }
}
