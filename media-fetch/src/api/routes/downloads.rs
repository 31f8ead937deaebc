//! Download job routes.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | POST | `/api/download` | Submit a download job |
//! | GET | `/api/task_status/{task_id}` | Poll a job |
//! | POST | `/api/task_status/{task_id}/revoke` | Revoke a job |
//! | POST | `/api/get_formats` | Probe a URL for downloadable formats |
//! | GET | `/api/download_logs` | Caller's recent job logs |
//! | GET | `/api/download_logs/{log_id}` | A single job log |

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::AuthUser;
use crate::api::server::AppState;
use crate::database::models::DownloadLogDbModel;
use crate::domain::{FormatDescriptor, ManifestEntry, MediaType};
use crate::pipeline::TaskStatusResponse;
use crate::service::{SubmitRequest, SubmittedJob};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/download", post(submit_download))
        .route("/task_status/{task_id}", get(task_status))
        .route("/task_status/{task_id}/revoke", post(revoke_task))
        .route("/get_formats", post(get_formats))
        .route("/download_logs", get(list_download_logs))
        .route("/download_logs/{log_id}", get(get_download_log))
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub url: Option<String>,
    pub format_code: Option<String>,
    /// `video` or `audio`
    pub format_type: Option<String>,
    #[serde(default)]
    pub is_playlist: bool,
    pub filename_template: Option<String>,
}

impl DownloadRequest {
    fn into_submit_request(self) -> Result<SubmitRequest, ApiError> {
        let (Some(url), Some(format_code), Some(format_type)) =
            (self.url, self.format_code, self.format_type)
        else {
            return Err(ApiError::validation(
                "Missing url, format_code, or format_type",
            ));
        };
        let media_type = MediaType::parse(format_type.trim()).ok_or_else(|| {
            ApiError::validation(format!(
                "Invalid format_type '{}', expected 'video' or 'audio'",
                format_type
            ))
        })?;
        Ok(SubmitRequest {
            url,
            format_code,
            media_type,
            is_playlist: self.is_playlist,
            filename_template: self.filename_template,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct FormatsRequest {
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FormatsResponse {
    pub formats: Vec<FormatDescriptor>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RevokeResponse {
    pub task_id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ListLogsQuery {
    pub limit: Option<i64>,
}

/// Job log as returned to clients, with the manifest decoded.
#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadLogResponse {
    pub id: String,
    pub owner_user_id: String,
    pub target_user_id: String,
    pub url: String,
    pub format_selector: String,
    pub media_type: String,
    pub is_playlist: bool,
    pub task_id: Option<String>,
    pub status: String,
    pub result_manifest: Option<Vec<ManifestEntry>>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<DownloadLogDbModel> for DownloadLogResponse {
    fn from(log: DownloadLogDbModel) -> Self {
        let result_manifest = log.manifest().unwrap_or_else(|e| {
            tracing::warn!(log_id = %log.id, "Stored manifest is unreadable: {}", e);
            None
        });
        Self {
            id: log.id,
            owner_user_id: log.owner_user_id,
            target_user_id: log.target_user_id,
            url: log.url,
            format_selector: log.format_selector,
            media_type: log.media_type,
            is_playlist: log.is_playlist,
            task_id: log.task_id,
            status: log.status,
            result_manifest,
            error_message: log.error_message,
            created_at: log.created_at,
            updated_at: log.updated_at,
        }
    }
}

async fn submit_download(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(request): Json<DownloadRequest>,
) -> ApiResult<(StatusCode, Json<SubmittedJob>)> {
    let request = request.into_submit_request()?;
    let submitted = state.service.submit(&claims.requester(), request).await?;
    Ok((StatusCode::ACCEPTED, Json(submitted)))
}

async fn task_status(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskStatusResponse>> {
    let response = state.service.task_status(&task_id).await.map_err(|e| {
        tracing::error!(task_id = %task_id, "Status query failed: {}", e);
        ApiError::internal("Failed to retrieve task status")
    })?;
    Ok(Json(response))
}

async fn revoke_task(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(task_id): Path<String>,
) -> ApiResult<Json<RevokeResponse>> {
    let task_state = state
        .service
        .revoke(&claims.requester(), &task_id)
        .await?;
    Ok(Json(RevokeResponse {
        task_id,
        status: task_state.as_str().to_string(),
    }))
}

async fn get_formats(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(request): Json<FormatsRequest>,
) -> ApiResult<Json<FormatsResponse>> {
    let url = request
        .url
        .ok_or_else(|| ApiError::validation("url is required"))?;
    let formats = state.service.get_formats(&url).await?;
    Ok(Json(FormatsResponse { formats }))
}

async fn list_download_logs(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Query(query): Query<ListLogsQuery>,
) -> ApiResult<Json<Vec<DownloadLogResponse>>> {
    let logs = state
        .service
        .list_logs(&claims.requester(), query.limit)
        .await?;
    Ok(Json(logs.into_iter().map(Into::into).collect()))
}

async fn get_download_log(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(log_id): Path<String>,
) -> ApiResult<Json<DownloadLogResponse>> {
    let log = state
        .service
        .get_log(&claims.requester(), &log_id)
        .await?;
    Ok(Json(log.into()))
}
