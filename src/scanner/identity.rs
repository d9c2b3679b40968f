//! Device/inode identity of files.
//!
//! # Overview
//!
//! Two directory entries are the same file exactly when they share a
//! `(device, inode)` pair. The engine uses this in two places:
//!
//! - Grouping: entries that are already hardlinks of each other are aliases,
//!   not duplicates, and are never relinked against each other.
//! - Execution: a freshly created link is only trusted once its identity
//!   equals the canonical file's.
//!
//! # Platform Support
//!
//! - **Unix**: `(st_dev, st_ino)` from file metadata
//! - **Other**: identity unavailable; callers must treat it as "unknown"
//!
//! # Example
//!
//! ```no_run
//! use crosslink::scanner::identity::FileIdentity;
//! use std::path::Path;
//!
//! let a = FileIdentity::of(Path::new("/mnt/disk1/a.mkv")).unwrap();
//! let b = FileIdentity::of(Path::new("/mnt/disk1/b.mkv")).unwrap();
//! if a.is_some() && a == b {
//!     println!("same file");
//! }
//! ```

use std::collections::HashSet;
use std::fs::Metadata;
use std::io;
use std::path::Path;

/// Platform identity of a file's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileIdentity {
    /// Device the inode lives on
    pub dev: u64,
    /// Inode number
    pub ino: u64,
}

impl FileIdentity {
    /// Identity from already-fetched metadata.
    ///
    /// Returns `None` on platforms without inode numbers.
    #[cfg(unix)]
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    /// Identity from already-fetched metadata.
    ///
    /// Returns `None` on platforms without inode numbers.
    #[cfg(not(unix))]
    #[must_use]
    pub fn from_metadata(_metadata: &Metadata) -> Option<Self> {
        None
    }

    /// Identity of the file at `path`, following symlinks.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the path cannot be stat'ed.
    pub fn of(path: &Path) -> io::Result<Option<Self>> {
        Ok(Self::from_metadata(&std::fs::metadata(path)?))
    }

    /// Whether identities can be determined on this platform.
    #[must_use]
    pub const fn is_supported() -> bool {
        cfg!(unix)
    }
}

/// Tracks seen identities to detect hardlink aliases.
///
/// `HardlinkTracker` is not thread-safe; use one per grouping pass.
#[derive(Debug, Default)]
pub struct HardlinkTracker {
    seen: HashSet<FileIdentity>,
}

impl HardlinkTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an identity; returns `true` if it was already seen.
    ///
    /// Unknown identities (`None`) are never reported as aliases.
    pub fn is_alias(&mut self, identity: Option<FileIdentity>) -> bool {
        match identity {
            Some(id) => !self.seen.insert(id),
            None => false,
        }
    }
}
