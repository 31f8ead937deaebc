//! Parsing of yt-dlp's stdout into progress events.

use crate::extractor::{ExtractorEvent, ProgressPhase};

/// Marker that prefixes every templated progress line.
pub const PROGRESS_MARKER: &str = "MFPROG";

/// Value passed to `--progress-template`.
///
/// Fields are pipe separated; yt-dlp prints `NA` for missing values.
pub fn progress_template() -> String {
    format!(
        "download:{}|%(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(info.playlist_index)s|%(info.n_entries)s",
        PROGRESS_MARKER
    )
}

/// Post-processor banners that mean the current item finished downloading.
const POSTPROCESS_PREFIXES: &[&str] = &[
    "[ExtractAudio]",
    "[Merger]",
    "[VideoConvertor]",
    "[VideoRemuxer]",
];

/// Parse one stdout line.
///
/// Returns `None` for lines that carry no progress information.
pub fn parse_progress_line(line: &str) -> Option<ExtractorEvent> {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix(PROGRESS_MARKER) {
        let fields: Vec<&str> = rest.trim_start_matches('|').split('|').collect();
        if fields.len() < 6 {
            return None;
        }
        let phase = ProgressPhase::parse(fields[0].trim())?;
        return Some(ExtractorEvent {
            phase,
            downloaded_bytes: parse_number(fields[1]),
            total_bytes: parse_number(fields[2]),
            total_bytes_estimate: parse_number(fields[3]),
            playlist_index: parse_number(fields[4]).map(|v| v as u32),
            playlist_count: parse_number(fields[5]).map(|v| v as u32),
        });
    }

    if POSTPROCESS_PREFIXES.iter().any(|p| line.starts_with(p)) {
        return Some(ExtractorEvent::new(ProgressPhase::Finished));
    }

    None
}

/// Parse an integer or float field; `NA`, `None` and garbage map to `None`.
fn parse_number(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(v) = raw.parse::<u64>() {
        return Some(v);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v as u64)
}

/// Extract the message of a yt-dlp `ERROR:` line.
pub fn parse_error_line(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix("ERROR:")
        .map(str::trim)
        .filter(|msg| !msg.is_empty())
}
