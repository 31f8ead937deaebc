//! Download service.
//!
//! Orchestrates submission, format probing, status polling and job log access
//! on behalf of the HTTP layer.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::database::models::DownloadLogDbModel;
use crate::database::repositories::DownloadLogRepository;
use crate::domain::{FormatDescriptor, MediaType};
use crate::extractor::Extractor;
use crate::formats::resolve_formats;
use crate::options::{JobRequest, build_job_configuration};
use crate::pipeline::{DownloadJob, JobExecutor, MediaStorage, TaskStatusResponse, build_status};
use crate::queue::{TaskQueue, TaskState};
use crate::utils::filename::sanitize_filename;
use crate::{Error, Result};

/// Default page size of [`DownloadService::list_logs`].
pub const DEFAULT_LOG_LIMIT: i64 = 20;
/// Upper bound of [`DownloadService::list_logs`].
pub const MAX_LOG_LIMIT: i64 = 100;

/// The authenticated user acting on the service.
#[derive(Debug, Clone)]
pub struct Requester {
    pub user_id: String,
    /// Display name; names the user's download directory.
    pub username: String,
}

/// A download request as received from a client.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub url: String,
    pub format_code: String,
    pub media_type: MediaType,
    pub is_playlist: bool,
    pub filename_template: Option<String>,
}

/// Identifiers handed back after a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedJob {
    pub task_id: String,
    pub log_id: String,
}

pub struct DownloadService {
    logs: Arc<dyn DownloadLogRepository>,
    extractor: Arc<dyn Extractor>,
    queue: Arc<TaskQueue>,
    executor: Arc<JobExecutor>,
}

impl DownloadService {
    pub fn new(
        logs: Arc<dyn DownloadLogRepository>,
        extractor: Arc<dyn Extractor>,
        queue: Arc<TaskQueue>,
        storage: MediaStorage,
    ) -> Self {
        let executor = Arc::new(JobExecutor::new(extractor.clone(), logs.clone(), storage));
        Self {
            logs,
            extractor,
            queue,
            executor,
        }
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn storage(&self) -> &MediaStorage {
        self.executor.storage()
    }

    /// Validate a request, record it in the job log and queue it.
    pub async fn submit(
        &self,
        requester: &Requester,
        request: SubmitRequest,
    ) -> Result<SubmittedJob> {
        let url = validate_url(&request.url)?;
        let format_code = request.format_code.trim();
        if format_code.is_empty() {
            return Err(Error::validation("format_code is required"));
        }

        let config = build_job_configuration(JobRequest {
            url: &url,
            format_code,
            media_type: request.media_type,
            is_playlist: request.is_playlist,
            filename_template: request.filename_template.as_deref(),
        });

        let log = DownloadLogDbModel::new(
            &requester.user_id,
            &requester.user_id,
            &url,
            format_code,
            request.media_type,
            request.is_playlist,
        );
        self.logs.create(&log).await?;

        let job = DownloadJob::new(
            self.executor.clone(),
            &log.id,
            sanitize_filename(&requester.username),
            config,
        );

        let task_id = match self.queue.submit(Box::new(job)) {
            Ok(task_id) => task_id,
            Err(e) => {
                let reason = e.to_string();
                match self.logs.mark_dispatch_failed(&log.id, &reason).await {
                    Ok(synthetic) => {
                        warn!(log_id = %log.id, task_id = %synthetic, "Job could not be queued: {}", reason)
                    }
                    Err(log_err) => {
                        error!(log_id = %log.id, "Failed to record dispatch failure: {}", log_err)
                    }
                }
                return Err(Error::QueueDispatch(format!(
                    "Failed to queue download: {}",
                    reason
                )));
            }
        };

        if let Err(e) = self.logs.assign_task_id(&log.id, &task_id).await {
            warn!(log_id = %log.id, task_id = %task_id, "Failed to record task id: {}", e);
        }

        info!(
            user = %requester.user_id,
            log_id = %log.id,
            task_id = %task_id,
            url = %url,
            format = %format_code,
            "Download queued"
        );
        Ok(SubmittedJob {
            task_id,
            log_id: log.id,
        })
    }

    /// Probe `url` and return its ranked format list.
    pub async fn get_formats(&self, url: &str) -> Result<Vec<FormatDescriptor>> {
        let url = validate_url(url)?;
        let info = self.extractor.probe(&url).await?;
        let formats = resolve_formats(&info.formats);
        info!(
            url = %url,
            raw = info.formats.len(),
            offered = formats.len(),
            "Formats resolved"
        );
        Ok(formats)
    }

    pub async fn task_status(&self, task_id: &str) -> Result<TaskStatusResponse> {
        let snapshot = self.queue.status(task_id);
        let log = match snapshot {
            Some(_) => None,
            None => self.logs.find_by_task_id(task_id).await?,
        };
        Ok(build_status(task_id, snapshot, log.as_ref()))
    }

    /// Revoke a task owned by (or targeted at) the requester.
    pub async fn revoke(&self, requester: &Requester, task_id: &str) -> Result<TaskState> {
        let visible = self
            .logs
            .find_by_task_id(task_id)
            .await?
            .is_some_and(|log| log.is_visible_to(&requester.user_id));
        if !visible {
            return Err(Error::not_found("Task", task_id));
        }
        let state = self.queue.revoke(task_id)?;
        info!(user = %requester.user_id, task_id = %task_id, state = %state, "Revoke requested");
        Ok(state)
    }

    pub async fn get_log(&self, requester: &Requester, log_id: &str) -> Result<DownloadLogDbModel> {
        let log = self.logs.get(log_id).await?;
        if !log.is_visible_to(&requester.user_id) {
            return Err(Error::not_found("DownloadLog", log_id));
        }
        Ok(log)
    }

    pub async fn list_logs(
        &self,
        requester: &Requester,
        limit: Option<i64>,
    ) -> Result<Vec<DownloadLogDbModel>> {
        let limit = limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
        self.logs.list_for_user(&requester.user_id, limit).await
    }
}

/// Accept absolute http(s) URLs only.
fn validate_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::validation("url is required"));
    }
    let parsed =
        url::Url::parse(raw).map_err(|e| Error::validation(format!("Invalid URL: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(raw.to_string()),
        _ => Err(Error::validation("Invalid URL: only http(s) URLs are supported")),
    }
}
