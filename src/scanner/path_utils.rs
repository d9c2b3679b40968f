//! Unicode normalization for basename keys.
//!
//! Disks written from different machines can store the same visual filename
//! with different byte sequences: macOS writes NFD (`e` + U+0301), Linux and
//! Windows usually write NFC (U+00E9). Phase 1 groups files by basename across
//! volumes, so names are folded to NFC before they are used as keys.
//!
//! ```
//! use crosslink::scanner::path_utils::normalize_name;
//!
//! assert_eq!(normalize_name("cafe\u{0301}.mkv"), normalize_name("café.mkv"));
//! ```

use std::borrow::Cow;
use std::path::Path;

use unicode_normalization::{is_nfc_quick, IsNormalized, UnicodeNormalization};

/// Normalize a name to NFC, borrowing when it already is.
#[must_use]
pub fn normalize_name(s: &str) -> Cow<'_, str> {
    match is_nfc_quick(s.chars()) {
        IsNormalized::Yes => Cow::Borrowed(s),
        _ => Cow::Owned(s.nfc().collect()),
    }
}

/// Grouping key for a path's final segment.
///
/// Non-UTF-8 bytes are replaced lossily, so two names that differ only in
/// invalid bytes share a key; Phase 2 separates them by content anyway.
/// Returns `None` for paths without a final segment.
#[must_use]
pub fn basename_key(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    Some(normalize_name(&name).into_owned())
}
