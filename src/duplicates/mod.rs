//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Basename grouping across volumes (Phase 1)
//! - Size splitting of name groups
//! - Content hashing and digest grouping (Phase 2)
//! - Canonical file selection by priority pattern

pub mod canonical;
pub mod finder;
pub mod groups;

pub use canonical::{
    resolve_groups, select_canonical, PatternError, PriorityPattern, ResolvedGroup, DEFAULT_PRIORITY_SEGMENT,
};
pub use finder::{
    group_by_content, ContentConfig, ContentStats, DuplicateFinder, FinderConfig, FinderError,
    ScanSummary,
};
pub use groups::{group_by_name, split_by_size, ContentGroup, NameGroup, NameGroupingStats};
