//! Output file classification.
//!
//! After the extractor finishes, every regular file in the job directory is
//! sorted into deliverables, intermediates (removed) and ignored files.

use std::path::Path;

/// Extensions treated as finished media when no specific extension is expected.
pub const KNOWN_MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "webm", "flv", "avi", "mov", "mp3", "m4a", "aac", "wav", "opus", "flac",
];

/// Sidecar and partial-download extensions left behind by the extractor.
pub const INTERMEDIATE_EXTENSIONS: &[&str] =
    &["json", "jpg", "jpeg", "png", "webp", "part", "ytdl", "temp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryClass {
    /// Part of the job result.
    Deliverable,
    /// Leftover to delete.
    Intermediate,
    /// Left in place and not reported.
    Ignored,
}

/// Lowercase extension of `name` without the dot.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Classify a file by name.
///
/// With an expected extension only exact matches are deliverables and other
/// media files count as intermediates (e.g. the source `.webm` after an mp3
/// extraction). Without one, any known media extension is a deliverable.
pub fn classify_entry(name: &str, expected: Option<&str>) -> EntryClass {
    let Some(ext) = extension_of(name) else {
        return EntryClass::Ignored;
    };
    let ext = ext.as_str();
    let is_media = KNOWN_MEDIA_EXTENSIONS.contains(&ext);

    match expected {
        Some(expected) if ext.eq_ignore_ascii_case(expected) => EntryClass::Deliverable,
        None if is_media => EntryClass::Deliverable,
        _ if INTERMEDIATE_EXTENSIONS.contains(&ext) => EntryClass::Intermediate,
        Some(_) if is_media => EntryClass::Intermediate,
        _ => EntryClass::Ignored,
    }
}
