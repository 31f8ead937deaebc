//! Filename sanitization utilities for cross-platform compatibility.
//!
//! Characters that are invalid on Windows, Linux or macOS are replaced while
//! valid Unicode text (CJK included) is preserved. Path separators count as
//! invalid, so a sanitized value is always a single path component.

/// Characters that are invalid in Windows filenames
const WINDOWS_INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows reserved filenames (case-insensitive)
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Sanitize `input` into a single safe path component.
///
/// Control characters and Windows-invalid characters become `_` (runs collapse
/// to one), leading/trailing spaces and dots are trimmed and Windows reserved
/// names get a `_` prefix. Returns `None` when nothing usable is left.
pub fn sanitize_component(input: &str) -> Option<String> {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || WINDOWS_INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return None;
    }

    let upper = trimmed.to_uppercase();
    let reserved = WINDOWS_RESERVED_NAMES
        .iter()
        .any(|name| upper == *name || upper.starts_with(&format!("{}.", name)));
    if reserved {
        return Some(format!("_{}", trimmed));
    }

    Some(trimmed.to_string())
}

/// Sanitize a string for use as a filename, falling back to `"unnamed"`.
///
/// ```
/// use media_fetch::utils::filename::sanitize_filename;
///
/// assert_eq!(sanitize_filename("hello?world"), "hello_world");
/// assert_eq!(sanitize_filename(""), "unnamed");
/// assert_eq!(sanitize_filename("CON"), "_CON");
/// ```
pub fn sanitize_filename(input: &str) -> String {
    sanitize_component(input).unwrap_or_else(|| "unnamed".to_string())
}
