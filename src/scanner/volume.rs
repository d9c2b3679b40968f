//! Volume roots, path classification and per-volume exclusion rules.
//!
//! # Overview
//!
//! Every scanned file belongs to exactly one *volume*: the longest configured
//! root that is a prefix of its path. Hardlinks can never span volumes, so
//! the volume is the unit every later phase reasons about.
//!
//! Exclusion patterns may contain the [`VOLUME_TOKEN`], which stands for
//! "this volume's root". A pattern is resolved separately against each
//! volume and is only active there if it names an existing directory.
//!
//! # Example
//!
//! ```no_run
//! use crosslink::scanner::{ExclusionRule, VolumeSet};
//! use std::path::{Path, PathBuf};
//!
//! let volumes = VolumeSet::resolve(&[], &["/mnt/disk*".to_string()]).unwrap();
//!
//! let rule = ExclusionRule::new("{volume}/appdata");
//! for volume in volumes.iter() {
//!     if let Some(dir) = rule.resolve(volume.root()) {
//!         println!("excluding {}", dir.display());
//!     }
//! }
//!
//! let id = volumes.classify(Path::new("/mnt/disk1/movies/x.mkv"));
//! ```

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Placeholder for a volume root inside an exclusion pattern.
pub const VOLUME_TOKEN: &str = "{volume}";

/// Identifier of a volume: its canonical root directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VolumeId(PathBuf);

impl VolumeId {
    /// Create a volume identifier from its root.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self(root.into())
    }

    /// Root directory of the volume.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Errors raised while resolving the configured volumes.
///
/// All of these are fatal: no mutation may happen without a valid volume set.
#[derive(thiserror::Error, Debug)]
pub enum VolumeError {
    /// Neither explicit roots nor globs produced a volume.
    #[error("no volumes could be resolved from the configuration")]
    NoVolumes,

    /// An explicitly configured root does not exist.
    #[error("volume root not found: {0}")]
    NotFound(PathBuf),

    /// An explicitly configured root is not a directory.
    #[error("volume root is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A volume glob is malformed.
    #[error("invalid volume glob '{0}': '*' is only allowed in the final path segment")]
    InvalidGlob(String),

    /// I/O failure while resolving a root or expanding a glob.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Ordered, immutable set of volume roots for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeSet {
    roots: Vec<PathBuf>,
}

impl VolumeSet {
    /// Build a set from roots as given, without touching the filesystem.
    ///
    /// Duplicate roots are dropped; order of first occurrence is kept.
    #[must_use]
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut unique: Vec<PathBuf> = Vec::new();
        for root in roots {
            if !unique.contains(&root) {
                unique.push(root);
            }
        }
        Self { roots: unique }
    }

    /// Resolve explicit roots and globs into a validated volume set.
    ///
    /// Explicit roots must exist and be directories. Globs may match
    /// nothing; their matches are appended in lexicographic order. Every
    /// root is canonicalized so later prefix checks compare real paths.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError`] for missing or non-directory explicit roots,
    /// malformed globs, or when the resulting set is empty.
    pub fn resolve(roots: &[PathBuf], globs: &[String]) -> Result<Self, VolumeError> {
        let mut resolved = Vec::with_capacity(roots.len());

        for root in roots {
            let metadata = fs::metadata(root).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => VolumeError::NotFound(root.clone()),
                _ => VolumeError::Io {
                    path: root.clone(),
                    source: e,
                },
            })?;
            if !metadata.is_dir() {
                return Err(VolumeError::NotADirectory(root.clone()));
            }
            resolved.push(canonical_root(root)?);
        }

        for glob in globs {
            for root in expand_glob(glob)? {
                resolved.push(canonical_root(&root)?);
            }
        }

        let set = Self::new(resolved);
        if set.is_empty() {
            return Err(VolumeError::NoVolumes);
        }
        if set.len() < 2 {
            log::warn!(
                "Only one volume configured ({}); nothing can be deduplicated across volumes",
                set.roots[0].display()
            );
        }
        for root in &set.roots {
            log::debug!("Volume: {}", root.display());
        }
        Ok(set)
    }

    /// Classify a path to the volume with the longest matching root.
    ///
    /// Returns `None` (unclassified) if no root is a prefix of the path.
    #[must_use]
    pub fn classify(&self, path: &Path) -> Option<VolumeId> {
        self.roots
            .iter()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count())
            .map(|root| VolumeId::new(root.clone()))
    }

    /// Roots of other volumes nested strictly inside `root`.
    #[must_use]
    pub fn nested_roots(&self, root: &Path) -> Vec<PathBuf> {
        self.roots
            .iter()
            .filter(|other| other.as_path() != root && other.starts_with(root))
            .cloned()
            .collect()
    }

    /// All roots in configured order.
    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Iterate over volume identifiers in configured order.
    pub fn iter(&self) -> impl Iterator<Item = VolumeId> + '_ {
        self.roots.iter().map(|root| VolumeId::new(root.clone()))
    }

    /// Number of volumes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

fn canonical_root(root: &Path) -> Result<PathBuf, VolumeError> {
    fs::canonicalize(root).map_err(|e| VolumeError::Io {
        path: root.to_path_buf(),
        source: e,
    })
}

/// Expand a glob whose final segment contains `*` into existing directories.
fn expand_glob(glob: &str) -> Result<Vec<PathBuf>, VolumeError> {
    let pattern = Path::new(glob);
    let (Some(parent), Some(name)) = (pattern.parent(), pattern.file_name()) else {
        return Err(VolumeError::InvalidGlob(glob.to_string()));
    };
    if parent.to_string_lossy().contains('*') {
        return Err(VolumeError::InvalidGlob(glob.to_string()));
    }

    let name = name.to_string_lossy();
    if !name.contains('*') {
        // Plain path: behave like an optional root.
        return Ok(if pattern.is_dir() {
            vec![pattern.to_path_buf()]
        } else {
            Vec::new()
        });
    }

    let regex_src = format!(
        "^{}$",
        name.split('*').map(regex::escape).collect::<Vec<_>>().join(".*")
    );
    let matcher =
        Regex::new(&regex_src).map_err(|_| VolumeError::InvalidGlob(glob.to_string()))?;

    let entries = fs::read_dir(parent).map_err(|e| VolumeError::Io {
        path: parent.to_path_buf(),
        source: e,
    })?;

    let mut matches: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter(|entry| matcher.is_match(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.path())
        .collect();
    matches.sort();

    if matches.is_empty() {
        log::warn!("Volume glob '{}' matched no directories", glob);
    }
    Ok(matches)
}

/// An exclusion pattern, resolved per volume.
///
/// Three forms are accepted:
/// - `{volume}/appdata` - the token is replaced by each volume root
/// - `/mnt/disk1/appdata` - absolute, only active on the volume containing it
/// - `appdata` - relative, resolved against every volume root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExclusionRule {
    pattern: String,
}

impl ExclusionRule {
    /// Create a rule from its pattern.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    /// The raw pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether the pattern carries the volume token.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.pattern.contains(VOLUME_TOKEN)
    }

    /// Candidate directory on `volume_root`, computed without filesystem access.
    ///
    /// Returns `None` when the pattern cannot denote a path inside this volume.
    #[must_use]
    pub fn candidate(&self, volume_root: &Path) -> Option<PathBuf> {
        let candidate = if self.is_wildcard() {
            PathBuf::from(
                self.pattern
                    .replace(VOLUME_TOKEN, &volume_root.to_string_lossy()),
            )
        } else {
            let raw = Path::new(&self.pattern);
            if raw.is_absolute() {
                raw.to_path_buf()
            } else {
                volume_root.join(raw)
            }
        };

        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return None;
        }
        if !candidate.starts_with(volume_root) {
            return None;
        }
        Some(candidate)
    }

    /// Resolve the rule against one volume.
    ///
    /// The rule is active only if the candidate is an existing directory
    /// inside the volume; anything else is dropped with a debug message.
    #[must_use]
    pub fn resolve(&self, volume_root: &Path) -> Option<PathBuf> {
        let Some(candidate) = self.candidate(volume_root) else {
            log::debug!(
                "Exclusion '{}' does not apply to volume {}",
                self.pattern,
                volume_root.display()
            );
            return None;
        };

        let is_dir = fs::symlink_metadata(&candidate).is_ok_and(|m| m.is_dir());
        if !is_dir {
            log::debug!(
                "Exclusion '{}' dropped for {}: {} is not a directory",
                self.pattern,
                volume_root.display(),
                candidate.display()
            );
            return None;
        }

        match fs::canonicalize(&candidate) {
            Ok(real) if real.starts_with(volume_root) => Some(real),
            Ok(real) => {
                log::debug!(
                    "Exclusion '{}' dropped: {} resolves outside {}",
                    self.pattern,
                    real.display(),
                    volume_root.display()
                );
                None
            }
            Err(e) => {
                log::debug!(
                    "Exclusion '{}' dropped: cannot resolve {}: {}",
                    self.pattern,
                    candidate.display(),
                    e
                );
                None
            }
        }
    }
}

/// Resolve all rules against all volumes into concrete directories.
///
/// A directory resolved against one volume but lying inside a volume nested
/// below it belongs to the nested volume and is dropped; exclusions never
/// reach across volume boundaries.
#[must_use]
pub fn resolve_exclusions(rules: &[ExclusionRule], volumes: &VolumeSet) -> Vec<PathBuf> {
    let mut resolved: Vec<PathBuf> = volumes
        .roots()
        .iter()
        .flat_map(|root| {
            rules
                .iter()
                .filter_map(move |rule| rule.resolve(root))
                .filter(move |dir| {
                    let owned = volumes.classify(dir).is_some_and(|id| id.root() == root);
                    if !owned {
                        log::debug!(
                            "Exclusion {} resolved on {} belongs to a nested volume; ignored",
                            dir.display(),
                            root.display()
                        );
                    }
                    owned
                })
        })
        .collect();
    resolved.sort();
    resolved.dedup();
    for dir in &resolved {
        log::debug!("Excluding {}", dir.display());
    }
    resolved
}
