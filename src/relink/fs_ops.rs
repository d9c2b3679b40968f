//! Filesystem primitives used by the relink executor.
//!
//! Every mutation the executor performs goes through [`FsOps`], so failure
//! handling can be exercised with an implementation that fails on demand.
//! [`StdFs`] is the real thing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::scanner::FileIdentity;

/// Primitive filesystem operations. None of them may panic.
pub trait FsOps: Send + Sync {
    /// Whether anything (file, directory, symlink) exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Whether `path` is a directory (symlinks followed).
    fn is_dir(&self, path: &Path) -> bool;

    /// Create a directory and its parents; succeeds if it already exists.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Create a hardlink at `link` to the data of `original`.
    fn hard_link(&self, original: &Path, link: &Path) -> io::Result<()>;

    /// Remove a file.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Resolve `path` to its real, absolute form.
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    /// Device/inode identity of `path`, when the platform provides one.
    fn identity(&self, path: &Path) -> io::Result<Option<FileIdentity>>;
}

/// [`FsOps`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFs;

impl FsOps for StdFs {
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn hard_link(&self, original: &Path, link: &Path) -> io::Result<()> {
        fs::hard_link(original, link)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }

    fn identity(&self, path: &Path) -> io::Result<Option<FileIdentity>> {
        FileIdentity::of(path)
    }
}

/// Whether `a` and `b` denote the same file.
///
/// Inode identity decides when both sides have one; otherwise the real
/// paths are compared.
///
/// # Errors
///
/// Returns the I/O error of the first path that cannot be inspected.
pub fn same_file(fs: &dyn FsOps, a: &Path, b: &Path) -> io::Result<bool> {
    if let (Some(ia), Some(ib)) = (fs.identity(a)?, fs.identity(b)?) {
        return Ok(ia == ib);
    }
    Ok(fs.canonicalize(a)? == fs.canonicalize(b)?)
}
