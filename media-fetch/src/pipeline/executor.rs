//! Job executor.
//!
//! Runs one download job: advances the job log through
//! `STARTED → DOWNLOADING → VERIFYING → SUCCESS | FAILURE`, relays extractor
//! progress to the task, and turns the job directory into a manifest.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::classify::{EntryClass, classify_entry};
use super::progress::{ProgressInfo, ProgressRelay};
use crate::database::repositories::DownloadLogRepository;
use crate::domain::{DownloadStatus, JobConfiguration, ManifestEntry};
use crate::extractor::{DownloadOutcome, Extractor};
use crate::queue::{QueuedTask, TaskContext, TaskState};
use crate::utils::fs::{DirEntryInfo, ensure_dir_all_with_op, list_dir};
use crate::{Error, Result};

/// Buffered extractor events between the child process and the relay.
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Layout of the media area on disk and its public URL root.
#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
    public_url: String,
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    /// `<root>/downloads/<user>/<task_id>`; unique per task.
    pub fn job_dir(&self, target_user: &str, task_id: &str) -> PathBuf {
        self.root.join("downloads").join(target_user).join(task_id)
    }

    /// Public URL of a file stored under the media root.
    pub fn url_for(&self, path: &Path) -> Result<String> {
        let relative = path.strip_prefix(&self.root).map_err(|_| {
            Error::Other(format!(
                "{} is outside the media root {}",
                path.display(),
                self.root.display()
            ))
        })?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Ok(format!(
            "{}/{}",
            self.public_url.trim_end_matches('/'),
            relative
        ))
    }
}

/// Shared dependencies of every download job.
pub struct JobExecutor {
    extractor: Arc<dyn Extractor>,
    logs: Arc<dyn DownloadLogRepository>,
    storage: MediaStorage,
}

impl JobExecutor {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        logs: Arc<dyn DownloadLogRepository>,
        storage: MediaStorage,
    ) -> Self {
        Self {
            extractor,
            logs,
            storage,
        }
    }

    pub fn storage(&self) -> &MediaStorage {
        &self.storage
    }

    /// Run a job to completion and return its manifest.
    ///
    /// Any fault is written to the job log as `"{kind}: {message}"` and
    /// returned to the queue.
    pub async fn execute(
        &self,
        log_id: &str,
        target_user: &str,
        config: &JobConfiguration,
        ctx: &TaskContext,
    ) -> Result<Vec<ManifestEntry>> {
        let task_id = ctx.task_id();
        let job_dir = self.storage.job_dir(target_user, task_id);
        info!(
            task_id = %task_id,
            log_id = %log_id,
            url = %config.source_url,
            selector = %config.selector,
            "Download job started"
        );

        self.advance(log_id, DownloadStatus::Started).await;
        ctx.update_state(
            TaskState::Started,
            ProgressInfo::new("Initializing...", 0).to_value(),
        );

        match self.run_stages(log_id, config, &job_dir, ctx).await {
            Ok(manifest) => {
                if let Err(e) = self.logs.complete(log_id, &manifest).await {
                    warn!(log_id = %log_id, "Failed to record job success: {}", e);
                }
                info!(task_id = %task_id, files = manifest.len(), "Download job finished");
                Ok(manifest)
            }
            Err(e) => {
                let e = explain_cancellation(e, ctx);
                error!(
                    task_id = %task_id,
                    log_id = %log_id,
                    url = %config.source_url,
                    dir = %job_dir.display(),
                    error = ?e,
                    "Download job failed: {}",
                    e
                );
                if let Err(log_err) = self.logs.fail(log_id, &e.summary()).await {
                    warn!(log_id = %log_id, "Failed to record job failure: {}", log_err);
                }
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        log_id: &str,
        config: &JobConfiguration,
        job_dir: &Path,
        ctx: &TaskContext,
    ) -> Result<Vec<ManifestEntry>> {
        ensure_dir_all_with_op("creating job directory", job_dir).await?;

        self.advance(log_id, DownloadStatus::Downloading).await;
        ctx.update_state(
            TaskState::Progress,
            ProgressInfo::new("Starting download...", 5).to_value(),
        );

        if self.download(config, job_dir, ctx).await? == DownloadOutcome::MaxDownloadsReached {
            if config.is_playlist {
                warn!(
                    task_id = %ctx.task_id(),
                    "Max downloads reached for a playlist job, verifying what was fetched"
                );
            } else {
                info!(task_id = %ctx.task_id(), "Max downloads reached (single item)");
            }
        }

        self.advance(log_id, DownloadStatus::Verifying).await;
        ctx.update_state(
            TaskState::Progress,
            ProgressInfo::new("Verifying output...", 99).to_value(),
        );

        let deliverables =
            collect_deliverables(job_dir, config.expected_final_extension.as_deref()).await?;
        deliverables
            .into_iter()
            .map(|entry| {
                Ok(ManifestEntry {
                    file_url: self.storage.url_for(&entry.path)?,
                    filename: entry.name,
                })
            })
            .collect()
    }

    /// Run the extractor while draining its events into the progress relay.
    async fn download(
        &self,
        config: &JobConfiguration,
        job_dir: &Path,
        ctx: &TaskContext,
    ) -> Result<DownloadOutcome> {
        let (tx, mut rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let relay = ProgressRelay::new(ctx);
        let mut download =
            self.extractor
                .download(config, job_dir, tx, ctx.cancellation_token().clone());

        let outcome = loop {
            tokio::select! {
                outcome = &mut download => break outcome,
                Some(event) = rx.recv() => {
                    relay.relay(&event);
                }
            }
        };
        while let Ok(event) = rx.try_recv() {
            relay.relay(&event);
        }
        outcome
    }

    async fn advance(&self, log_id: &str, status: DownloadStatus) {
        if let Err(e) = self.logs.update_status(log_id, status).await {
            warn!(log_id = %log_id, status = %status, "Failed to update job log: {}", e);
        }
    }
}

/// Give a cancelled download a reason the caller can act on.
fn explain_cancellation(err: Error, ctx: &TaskContext) -> Error {
    if !matches!(err, Error::Cancelled(_)) {
        return err;
    }
    if ctx.state() == TaskState::Revoked {
        Error::Cancelled("task revoked".to_string())
    } else if ctx.deadline_exceeded() {
        Error::Cancelled("job exceeded its deadline".to_string())
    } else {
        err
    }
}

/// Classify the job directory, delete intermediates and return deliverables.
pub async fn collect_deliverables(
    dir: &Path,
    expected_extension: Option<&str>,
) -> Result<Vec<DirEntryInfo>> {
    let listing = list_dir(dir)
        .await
        .map_err(|e| Error::verification(format!("could not scan {}: {}", dir.display(), e)))?;
    if listing.is_empty() {
        return Err(Error::verification(format!(
            "no files found in {} after download reported success",
            dir.display()
        )));
    }

    let mut deliverables = Vec::new();
    for entry in listing.iter().filter(|e| e.is_file) {
        match classify_entry(&entry.name, expected_extension) {
            EntryClass::Deliverable => deliverables.push(entry.clone()),
            EntryClass::Intermediate => {
                debug!("Removing intermediate file {}", entry.path.display());
                if let Err(e) = tokio::fs::remove_file(&entry.path).await {
                    warn!("Failed to remove {}: {}", entry.path.display(), e);
                }
            }
            EntryClass::Ignored => debug!("Ignoring {}", entry.name),
        }
    }

    if deliverables.is_empty() {
        let names: Vec<&str> = listing.iter().map(|e| e.name.as_str()).collect();
        return Err(Error::verification(format!(
            "no file with extension '{}' found in {} after processing; files present: [{}]",
            expected_extension.unwrap_or("any known media"),
            dir.display(),
            names.join(", ")
        )));
    }
    Ok(deliverables)
}

/// A download job as submitted to the task queue.
pub struct DownloadJob {
    executor: Arc<JobExecutor>,
    log_id: String,
    target_user: String,
    config: JobConfiguration,
}

impl DownloadJob {
    pub fn new(
        executor: Arc<JobExecutor>,
        log_id: impl Into<String>,
        target_user: impl Into<String>,
        config: JobConfiguration,
    ) -> Self {
        Self {
            executor,
            log_id: log_id.into(),
            target_user: target_user.into(),
            config,
        }
    }
}

#[async_trait]
impl QueuedTask for DownloadJob {
    fn name(&self) -> &str {
        "download"
    }

    async fn run(&self, ctx: TaskContext) -> Result<Value> {
        let manifest = self
            .executor
            .execute(&self.log_id, &self.target_user, &self.config, &ctx)
            .await?;
        Ok(serde_json::to_value(manifest)?)
    }

    async fn abandon(&self, reason: &Error) {
        warn!(log_id = %self.log_id, "Download job abandoned: {}", reason);
        if let Err(e) = self.executor.logs.fail(&self.log_id, &reason.summary()).await {
            warn!(log_id = %self.log_id, "Failed to record abandoned job: {}", e);
        }
    }
}
