//! Format descriptors offered to clients before a download is submitted.

use serde::{Deserialize, Serialize};

/// Kind of media a format (or a job) produces.
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
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One downloadable option, as returned by `POST /api/get_formats`.
///
/// `code` doubles as the selector the client sends back when submitting a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub code: String,
    pub description: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub extension: String,
    #[serde(rename = "filesize")]
    pub estimated_size_bytes: Option<u64>,
    #[serde(rename = "sort_key")]
    pub rank_key: i64,
}

impl FormatDescriptor {
    pub fn new(
        code: impl Into<String>,
        description: impl Into<String>,
        media_type: MediaType,
        extension: impl Into<String>,
        rank_key: i64,
    ) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            media_type,
            extension: extension.into(),
            estimated_size_bytes: None,
            rank_key,
        }
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.estimated_size_bytes = size;
        self
    }
}

/// Per-stream metadata reported by the extractor's probe.
///
/// All fields are optional; the extractor omits whatever it does not know.
/// Numeric fields are kept as `f64` since the extractor is loose about
/// integer vs float output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawStream {
    pub format_id: Option<String>,
    pub format_note: Option<String>,
    pub format: Option<String>,
    pub ext: Option<String>,
    pub url: Option<String>,
    pub manifest_url: Option<String>,
    pub protocol: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub fps: Option<f64>,
    pub abr: Option<f64>,
    pub vbr: Option<f64>,
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
}

impl RawStream {
    fn codec_present(codec: &Option<String>) -> bool {
        codec.as_deref().is_some_and(|c| c != "none")
    }

    pub fn has_video(&self) -> bool {
        Self::codec_present(&self.vcodec)
    }

    pub fn has_audio(&self) -> bool {
        Self::codec_present(&self.acodec)
    }

    /// Exact size when known, otherwise the extractor's estimate.
    pub fn size_bytes(&self) -> Option<u64> {
        self.filesize
            .or(self.filesize_approx)
            .filter(|size| *size > 0.0)
            .map(|size| size as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_parse() {
        assert_eq!(MediaType::parse("video"), Some(MediaType::Video));
        assert_eq!(MediaType::parse("audio"), Some(MediaType::Audio));
        assert_eq!(MediaType::parse("Video"), None);
        assert_eq!(MediaType::Audio.to_string(), "audio");
    }

    #[test]
    fn test_raw_stream_codec_detection() {
        let stream: RawStream = serde_json::from_str(
            r#"{"format_id":"140","vcodec":"none","acodec":"mp4a.40.2","abr":129.5,"filesize_approx":2048.7}"#,
        )
        .unwrap();
        assert!(!stream.has_video());
        assert!(stream.has_audio());
        assert_eq!(stream.size_bytes(), Some(2048));

        let unknown = RawStream::default();
        assert!(!unknown.has_video());
        assert!(!unknown.has_audio());
        assert_eq!(unknown.size_bytes(), None);
    }

    #[test]
    fn test_descriptor_wire_names() {
        let desc = FormatDescriptor::new("140", "m4a audio", MediaType::Audio, "m4a", 129)
            .with_size(Some(1024));
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json["type"], "audio");
        assert_eq!(json["filesize"], 1024);
        assert_eq!(json["sort_key"], 129);
        assert_eq!(json["code"], "140");
    }
}
