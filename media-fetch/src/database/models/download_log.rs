//! Download log database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::{DownloadStatus, ManifestEntry, MediaType};
use crate::Result;

/// Persisted lifecycle record of one download request.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DownloadLogDbModel {
    pub id: String,
    /// User who submitted the request
    pub owner_user_id: String,
    /// User whose download area receives the output
    pub target_user_id: String,
    pub url: String,
    /// Format code exactly as submitted
    pub format_selector: String,
    /// video | audio
    pub media_type: String,
    pub is_playlist: bool,
    /// Queue task id; written once after dispatch
    pub task_id: Option<String>,
    /// PENDING, STARTED, DOWNLOADING, VERIFYING, SUCCESS, FAILURE
    pub status: String,
    /// JSON array of `{filename, file_url}`
    pub result_manifest: Option<String>,
    pub error_message: Option<String>,
    /// ISO 8601 timestamp when the log was created
    pub created_at: String,
    /// ISO 8601 timestamp when the log was last updated
    pub updated_at: String,
}

impl DownloadLogDbModel {
    pub fn new(
        owner_user_id: impl Into<String>,
        target_user_id: impl Into<String>,
        url: impl Into<String>,
        format_selector: impl Into<String>,
        media_type: MediaType,
        is_playlist: bool,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_user_id: owner_user_id.into(),
            target_user_id: target_user_id.into(),
            url: url.into(),
            format_selector: format_selector.into(),
            media_type: media_type.as_str().to_string(),
            is_playlist,
            task_id: None,
            status: DownloadStatus::Pending.as_str().to_string(),
            result_manifest: None,
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Parsed status. Unknown strings are treated as `PENDING`.
    pub fn status(&self) -> DownloadStatus {
        DownloadStatus::parse(&self.status).unwrap_or(DownloadStatus::Pending)
    }

    pub fn manifest(&self) -> Result<Option<Vec<ManifestEntry>>> {
        match &self.result_manifest {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    /// Whether `user_id` may read this log.
    pub fn is_visible_to(&self, user_id: &str) -> bool {
        self.owner_user_id == user_id || self.target_user_id == user_id
    }
}
