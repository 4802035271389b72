//! Filesystem-safe names for playlists, artists and albums.

use unicode_normalization::UnicodeNormalization;

const UNTITLED: &str = "untitled";

/// Normalize a user-supplied name into a form usable as both a directory name
/// and a bucket key.
///
/// NFC-normalizes, keeps alphanumerics and `-`, collapses every other run of
/// characters into a single `_`, and strips leading and trailing `_`/`.`.
pub fn compatible_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_separator = false;
    for c in name.nfc() {
        if c.is_alphanumeric() || c == '-' {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.push(c);
        } else {
            pending_separator = true;
        }
    }

    let trimmed = out.trim_matches(|c| c == '_' || c == '.');
    if trimmed.is_empty() {
        UNTITLED.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Like [`compatible_name`] but keeps the file extension (lowercased).
pub fn compatible_file_name(stem: &str, extension: Option<&str>) -> String {
    let stem = compatible_name(stem);
    match extension.map(compatible_name) {
        Some(ext) if ext != UNTITLED => format!("{}.{}", stem, ext.to_lowercase()),
        _ => stem,
    }
}
