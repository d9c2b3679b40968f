//! BLAKE3 content hashing.
//!
//! # Overview
//!
//! The [`Hasher`] computes a 256-bit BLAKE3 digest of a file's full
//! contents. Small files are streamed through a fixed buffer; files above
//! [`MMAP_THRESHOLD`] are memory-mapped and hashed on the rayon pool.
//!
//! The [`ContentHasher`] trait is the seam the duplicate finder depends on,
//! so tests can substitute digests without touching the disk.
//!
//! # Example
//!
//! ```no_run
//! use crosslink::scanner::{hash_to_hex, Hasher};
//! use std::path::Path;
//!
//! let hasher = Hasher::new();
//! let hash = hasher.full_hash(Path::new("/mnt/disk1/movies/x.mkv")).unwrap();
//! println!("{}", hash_to_hex(&hash));
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::HashError;

/// A 256-bit content digest.
pub type Hash = [u8; 32];

/// Read buffer size for streamed hashing.
const BUFFER_SIZE: usize = 64 * 1024;

/// Files larger than this are hashed through a memory map.
pub const MMAP_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Source of content digests.
pub trait ContentHasher: Send + Sync {
    /// Digest of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns a typed [`HashError`] if the file cannot be read.
    fn digest(&self, path: &Path) -> Result<Hash, HashError>;
}

/// BLAKE3 file hasher.
#[derive(Debug, Clone, Default)]
pub struct Hasher {
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Hasher {
    /// Create a new hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort streamed hashing between buffer reads once the flag is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Hash the entire contents of a file.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::NotFound`], [`HashError::PermissionDenied`] or
    /// [`HashError::Io`] for read failures, and [`HashError::Interrupted`]
    /// when shutdown was requested mid-file.
    pub fn full_hash(&self, path: &Path) -> Result<Hash, HashError> {
        if self.is_shutdown_requested() {
            return Err(HashError::Interrupted(path.to_path_buf()));
        }

        let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let len = file
            .metadata()
            .map_err(|e| HashError::from_io(path, e))?
            .len();

        let mut hasher = blake3::Hasher::new();

        if len > MMAP_THRESHOLD {
            log::trace!("Hashing {} via mmap ({} bytes)", path.display(), len);
            hasher
                .update_mmap_rayon(path)
                .map_err(|e| HashError::from_io(path, e))?;
            return Ok(*hasher.finalize().as_bytes());
        }

        let mut buffer = vec![0u8; BUFFER_SIZE];
        loop {
            if self.is_shutdown_requested() {
                return Err(HashError::Interrupted(path.to_path_buf()));
            }
            let read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::from_io(path, e)),
            };
            hasher.update(&buffer[..read]);
        }

        Ok(*hasher.finalize().as_bytes())
    }
}

impl ContentHasher for Hasher {
    fn digest(&self, path: &Path) -> Result<Hash, HashError> {
        self.full_hash(path)
    }
}

/// Convert a hash to a lowercase hexadecimal string.
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    use std::fmt::Write;
    hash.iter().fold(String::with_capacity(64), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}
