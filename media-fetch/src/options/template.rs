//! Output filename template handling.
//!
//! A user template is reduced to a single relative path component. Anything
//! that looks like an escape from the job directory falls back to the default.

use crate::utils::filename::sanitize_component;

pub const DEFAULT_SINGLE_TEMPLATE: &str = "%(title)s [%(id)s].%(ext)s";
pub const DEFAULT_PLAYLIST_TEMPLATE: &str = "%(playlist_index)s - %(title)s [%(id)s].%(ext)s";

const EXT_PLACEHOLDER: &str = "%(ext)s";

pub fn default_template(is_playlist: bool) -> &'static str {
    if is_playlist {
        DEFAULT_PLAYLIST_TEMPLATE
    } else {
        DEFAULT_SINGLE_TEMPLATE
    }
}

/// Pick the output template for a job.
///
/// Returns the default when `raw` is missing, blank, contains a traversal
/// sequence, is absolute, or sanitizes down to nothing. A surviving template
/// without `%(ext)s` gets `.%(ext)s` appended.
pub fn resolve_output_template(raw: Option<&str>, is_playlist: bool) -> String {
    let fallback = default_template(is_playlist);

    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return fallback.to_string();
    };

    if has_traversal(raw) || is_absolute_like(raw) {
        tracing::warn!(template = %raw, "Rejected unsafe filename template, using default");
        return fallback.to_string();
    }

    let Some(sanitized) = sanitize_component(raw) else {
        return fallback.to_string();
    };

    if is_absolute_like(&sanitized) || has_parent_segment(&sanitized) {
        tracing::warn!(template = %raw, "Sanitized template still unsafe, using default");
        return fallback.to_string();
    }

    if sanitized.contains(EXT_PLACEHOLDER) {
        sanitized
    } else {
        format!("{}.{}", sanitized, EXT_PLACEHOLDER)
    }
}

fn has_traversal(s: &str) -> bool {
    s.contains("../") || s.contains("..\\")
}

fn has_parent_segment(s: &str) -> bool {
    s.split(['/', '\\']).any(|segment| segment == "..")
}

fn is_absolute_like(s: &str) -> bool {
    if s.starts_with('/') || s.starts_with('\\') {
        return true;
    }
    let bytes = s.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
