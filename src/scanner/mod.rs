//! Scanner module for volume classification, enumeration and hashing.
//!
//! This module provides functionality for:
//! - Mapping paths to the volume (mount root) they live on
//! - Resolving per-volume exclusion patterns
//! - Parallel directory walking across all volumes using jwalk
//! - Content hashing with BLAKE3
//! - Inode identity for hardlink awareness
//! - Unicode basename normalization
//!
//! # Architecture
//!
//! - [`volume`]: Volume roots, path classification, exclusion rules
//! - [`walker`]: Directory traversal and file discovery
//! - [`hasher`]: BLAKE3 file hashing (streaming and memory-mapped)
//! - [`identity`]: `(device, inode)` identity of a file
//! - [`path_utils`]: NFC basename keys
//!
//! # Example
//!
//! ```no_run
//! use crosslink::scanner::{VolumeSet, Walker, WalkerConfig};
//! use std::path::PathBuf;
//!
//! let volumes = VolumeSet::resolve(
//!     &[PathBuf::from("/mnt/disk1"), PathBuf::from("/mnt/disk2")],
//!     &[],
//! ).unwrap();
//!
//! let walker = Walker::new(&volumes, Vec::new(), WalkerConfig::default());
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(record) => println!("{} on {}", record.path.display(), record.volume),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod hasher;
pub mod identity;
pub mod path_utils;
pub mod volume;
pub mod walker;

use std::path::{Path, PathBuf};

use serde::Serialize;

// Re-export main types
pub use hasher::{hash_to_hex, ContentHasher, Hash, Hasher};
pub use identity::FileIdentity;
pub use volume::{ExclusionRule, VolumeId, VolumeSet, VOLUME_TOKEN};
pub use walker::Walker;

/// An enumerated regular file, classified to its volume.
///
/// Records are created once by the walker and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// Absolute path to the file
    pub path: PathBuf,
    /// Volume the file lives on
    pub volume: VolumeId,
    /// NFC-normalized final path segment
    pub basename: String,
    /// File size in bytes
    pub size: u64,
    /// Device/inode identity, when the platform exposes one
    #[serde(skip)]
    pub identity: Option<FileIdentity>,
}

impl FileRecord {
    /// Create a record for a path already known to live on `volume`.
    ///
    /// Returns `None` when the path has no final segment (e.g. `/`).
    #[must_use]
    pub fn new(path: PathBuf, volume: VolumeId, size: u64) -> Option<Self> {
        let basename = path_utils::basename_key(&path)?;
        Some(Self {
            path,
            volume,
            basename,
            size,
            identity: None,
        })
    }

    /// Classify `path` against `volumes` and build a record.
    ///
    /// Paths outside every configured volume are never assigned one; they
    /// yield `None` and must be dropped by the caller.
    #[must_use]
    pub fn classify(path: PathBuf, size: u64, volumes: &VolumeSet) -> Option<Self> {
        let volume = volumes.classify(&path)?;
        Self::new(path, volume, size)
    }

    /// Attach the device/inode identity.
    #[must_use]
    pub fn with_identity(mut self, identity: Option<FileIdentity>) -> Self {
        self.identity = identity;
        self
    }

    /// Path relative to the record's own volume root.
    #[must_use]
    pub fn relative_path(&self) -> Option<&Path> {
        self.path.strip_prefix(self.volume.root()).ok()
    }
}

/// Configuration for directory walking.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,

    /// Minimum file size to include (in bytes).
    /// Defaults to 1 so empty files, which all share one digest, are skipped.
    pub min_size: u64,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            skip_hidden: false,
            min_size: 1,
        }
    }
}

impl WalkerConfig {
    /// Set whether hidden entries are skipped.
    #[must_use]
    pub fn with_skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }

    /// Set the minimum file size.
    #[must_use]
    pub fn with_min_size(mut self, min_size: u64) -> Self {
        self.min_size = min_size;
        self
    }
}

/// Errors that can occur during directory scanning.
///
/// Every variant is local to one subtree or file; the scan continues.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The entry vanished between listing and inspection.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    /// Build a scan error from an I/O error, keeping the common kinds typed.
    #[must_use]
    pub fn from_io(path: &Path, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// Path the error refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::PermissionDenied(p) | Self::NotFound(p) | Self::Io { path: p, .. } => p,
        }
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Hashing stopped because shutdown was requested.
    #[error("Hashing interrupted: {0}")]
    Interrupted(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    /// Build a hash error from an I/O error, keeping the common kinds typed.
    #[must_use]
    pub fn from_io(path: &Path, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// Path the error refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p)
            | Self::PermissionDenied(p)
            | Self::Interrupted(p)
            | Self::Io { path: p, .. } => p,
        }
    }
}
