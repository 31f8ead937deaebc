//! Boundary to the external media extractor.
//!
//! The pipeline only sees [`Extractor`]; translating a [`JobConfiguration`]
//! into command-line flags happens inside the concrete adapter.

pub mod ytdlp;

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::domain::{JobConfiguration, RawStream};

pub use ytdlp::{YtDlpConfig, YtDlpExtractor};

/// Metadata returned by a format probe.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProbeInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    pub formats: Vec<RawStream>,
}

/// Phase reported by a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Downloading,
    Finished,
    Error,
}

impl ProgressPhase {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "downloading" => Some(Self::Downloading),
            "finished" => Some(Self::Finished),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Progress reported by the extractor while a job runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorEvent {
    pub phase: ProgressPhase,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub total_bytes_estimate: Option<u64>,
    pub playlist_index: Option<u32>,
    pub playlist_count: Option<u32>,
}

impl ExtractorEvent {
    pub fn new(phase: ProgressPhase) -> Self {
        Self {
            phase,
            downloaded_bytes: None,
            total_bytes: None,
            total_bytes_estimate: None,
            playlist_index: None,
            playlist_count: None,
        }
    }

    pub fn with_bytes(mut self, downloaded: u64, total: u64) -> Self {
        self.downloaded_bytes = Some(downloaded);
        self.total_bytes = Some(total);
        self
    }

    pub fn with_playlist(mut self, index: u32, count: u32) -> Self {
        self.playlist_index = Some(index);
        self.playlist_count = Some(count);
        self
    }

    /// Exact total when known and non-zero, otherwise the estimate.
    pub fn total(&self) -> Option<u64> {
        self.total_bytes
            .filter(|t| *t > 0)
            .or(self.total_bytes_estimate)
            .or(self.total_bytes)
    }

    /// `(index, count)` when the event belongs to a playlist item.
    pub fn playlist_position(&self) -> Option<(u32, u32)> {
        match (self.playlist_index, self.playlist_count) {
            (Some(i), Some(n)) if i > 0 && n > 0 => Some((i, n)),
            _ => None,
        }
    }
}

/// How a download run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed,
    /// The extractor stopped because `max_downloads` was reached.
    MaxDownloadsReached,
}

/// An external tool able to probe sources and download them.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Fetch source metadata without downloading.
    async fn probe(&self, url: &str) -> Result<ProbeInfo>;

    /// Download `config.source_url` into `output_dir`.
    ///
    /// Progress goes to `events`; the sender is dropped when the run ends.
    /// Cancelling `cancel` stops the run with [`crate::Error::Cancelled`].
    async fn download(
        &self,
        config: &JobConfiguration,
        output_dir: &Path,
        events: mpsc::Sender<ExtractorEvent>,
        cancel: CancellationToken,
    ) -> Result<DownloadOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_prefers_exact_bytes() {
        let mut event = ExtractorEvent::new(ProgressPhase::Downloading);
        event.total_bytes = Some(100);
        event.total_bytes_estimate = Some(90);
        assert_eq!(event.total(), Some(100));

        event.total_bytes = None;
        assert_eq!(event.total(), Some(90));

        event.total_bytes = Some(0);
        event.total_bytes_estimate = None;
        assert_eq!(event.total(), Some(0));
    }

    #[test]
    fn test_playlist_position_requires_both_values() {
        let event = ExtractorEvent::new(ProgressPhase::Finished).with_playlist(2, 5);
        assert_eq!(event.playlist_position(), Some((2, 5)));

        let mut partial = ExtractorEvent::new(ProgressPhase::Finished);
        partial.playlist_index = Some(2);
        assert_eq!(partial.playlist_position(), None);
    }

    #[test]
    fn test_media_info_tolerates_extra_fields() {
        let info: ProbeInfo = serde_json::from_str(
            r#"{"id":"abc","title":"Clip","duration":12.5,"formats":[{"format_id":"18","ext":"mp4"}]}"#,
        )
        .unwrap();
        assert_eq!(info.title.as_deref(), Some("Clip"));
        assert_eq!(info.formats.len(), 1);
    }
}
