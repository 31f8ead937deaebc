//! Download job value types and the job-log state machine.

use serde::{Deserialize, Serialize};

use super::format::MediaType;
use crate::Error;

/// A post-processing step requested from the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostProcessor {
    /// Extract the audio track and transcode it to `codec`.
    ExtractAudio {
        codec: String,
        /// Target bitrate such as `192K`; `None` for lossless codecs.
        quality: Option<String>,
    },
    /// Remux or re-encode the video into `container`.
    ConvertVideo { container: String },
    EmbedThumbnail,
}

impl PostProcessor {
    /// Whether this step already writes the thumbnail into the output.
    pub fn embeds_thumbnail(&self) -> bool {
        matches!(self, Self::ExtractAudio { .. } | Self::ConvertVideo { .. })
    }
}

/// Fully resolved instructions for one download job.
///
/// Built once by the option translator and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfiguration {
    pub source_url: String,
    /// Format selector handed to the extractor (conversion suffix stripped).
    pub selector: String,
    pub media_type: MediaType,
    pub is_playlist: bool,
    /// Relative output template; joined onto the job directory by the extractor.
    pub output_template: String,
    pub post_processors: Vec<PostProcessor>,
    pub embed_thumbnail: bool,
    pub embed_metadata: bool,
    /// Lowercase extension without the dot. `None` when the output type is not known up front.
    pub expected_final_extension: Option<String>,
    pub max_downloads: Option<u32>,
    pub ignore_errors: bool,
}

impl JobConfiguration {
    /// Number of audio-extraction steps; at most one for any valid configuration.
    pub fn extraction_steps(&self) -> usize {
        self.post_processors
            .iter()
            .filter(|pp| matches!(pp, PostProcessor::ExtractAudio { .. }))
            .count()
    }
}

/// A deliverable file produced by a successful job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub filename: String,
    pub file_url: String,
}

/// Job log lifecycle.
///
/// Statuses only move forward through
/// `PENDING → STARTED → DOWNLOADING → VERIFYING → {SUCCESS | FAILURE}`.
/// `FAILURE` may be entered from any non-terminal status.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadStatus {
    Pending,
    Started,
    Downloading,
    Verifying,
    Success,
    Failure,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Started => "STARTED",
            Self::Downloading => "DOWNLOADING",
            Self::Verifying => "VERIFYING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "STARTED" => Some(Self::Started),
            "DOWNLOADING" => Some(Self::Downloading),
            "VERIFYING" => Some(Self::Verifying),
            "SUCCESS" => Some(Self::Success),
            "FAILURE" => Some(Self::Failure),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    fn ordinal(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Started => 1,
            Self::Downloading => 2,
            Self::Verifying => 3,
            Self::Success | Self::Failure => 4,
        }
    }

    pub fn can_transition_to(&self, target: DownloadStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        target.ordinal() >= self.ordinal()
    }

    pub fn transition_to(&self, target: DownloadStatus) -> Result<DownloadStatus, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
