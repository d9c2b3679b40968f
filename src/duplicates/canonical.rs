//! Canonical file selection.
//!
//! Within a content group, the canonical file is the first member (in
//! lexicographic path order) with a path segment matching the priority
//! pattern. Groups without such a member have no canonical file and are
//! reported, never acted on.

use std::path::{Component, Path};

use regex::Regex;

use super::ContentGroup;
use crate::events::{EventSink, RunEvent};
use crate::scanner::FileRecord;

/// Default priority segment pattern: `torrent` or `torrents`.
pub const DEFAULT_PRIORITY_SEGMENT: &str = "^torrents?$";

/// Errors building a priority pattern.
#[derive(thiserror::Error, Debug)]
pub enum PatternError {
    /// The regular expression is invalid.
    #[error("invalid priority pattern '{pattern}': {source}")]
    Invalid {
        /// The rejected pattern
        pattern: String,
        /// The regex error
        #[source]
        source: regex::Error,
    },
}

/// Case-insensitive matcher applied to each path segment.
#[derive(Debug, Clone)]
pub struct PriorityPattern {
    regex: Regex,
}

impl PriorityPattern {
    /// Compile a segment pattern; matching is always case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::Invalid`] for a malformed regular expression.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let regex = Regex::new(&format!("(?i){pattern}")).map_err(|source| {
            PatternError::Invalid {
                pattern: pattern.to_string(),
                source,
            }
        })?;
        Ok(Self { regex })
    }

    /// The pattern source, without the case-insensitivity flag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.regex.as_str().trim_start_matches("(?i)")
    }

    /// Whether any normal segment of `path` matches.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        path.components().any(|c| match c {
            Component::Normal(segment) => self.regex.is_match(&segment.to_string_lossy()),
            _ => false,
        })
    }

    /// Whether the record's full path matches.
    #[must_use]
    pub fn matches_record(&self, record: &FileRecord) -> bool {
        self.matches(&record.path)
    }
}

/// A content group with its chosen canonical file, if any.
#[derive(Debug, Clone)]
pub struct ResolvedGroup {
    /// The content group
    pub group: ContentGroup,
    /// Index into `group.members` of the canonical file
    pub canonical: Option<usize>,
}

impl ResolvedGroup {
    /// The canonical record, if one was selected.
    #[must_use]
    pub fn canonical(&self) -> Option<&FileRecord> {
        self.canonical.and_then(|i| self.group.members.get(i))
    }

    /// Members other than the canonical file.
    pub fn others(&self) -> impl Iterator<Item = &FileRecord> + '_ {
        self.group
            .members
            .iter()
            .enumerate()
            .filter(move |(i, _)| Some(*i) != self.canonical)
            .map(|(_, m)| m)
    }
}

/// Choose the canonical member of `group`.
///
/// Members are already in lexicographic path order, so the choice is
/// reproducible when several members match.
#[must_use]
pub fn select_canonical(group: ContentGroup, pattern: &PriorityPattern) -> ResolvedGroup {
    let canonical = group
        .members
        .iter()
        .position(|member| pattern.matches_record(member));
    ResolvedGroup { group, canonical }
}

/// Select canonicals for every group, reporting each decision to `sink`.
pub fn resolve_groups(
    groups: Vec<ContentGroup>,
    pattern: &PriorityPattern,
    sink: &dyn EventSink,
) -> Vec<ResolvedGroup> {
    groups
        .into_iter()
        .map(|group| {
            let resolved = select_canonical(group, pattern);
            let digest = resolved.group.digest_hex();
            match resolved.canonical() {
                Some(canonical) => sink.emit(&RunEvent::CanonicalSelected {
                    digest,
                    canonical: canonical.path.clone(),
                }),
                None => sink.emit(&RunEvent::NoCanonical {
                    digest,
                    members: resolved.group.paths(),
                }),
            }
            resolved
        })
        .collect()
}
