//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use media_fetch::database::models::DownloadLogDbModel;
use media_fetch::database::repositories::{DownloadLogRepository, SqlxDownloadLogRepository};
use media_fetch::database::{DbPool, init_pool_with_size, run_migrations};
use media_fetch::domain::{DownloadStatus, JobConfiguration, ManifestEntry, RawStream};
use media_fetch::extractor::{
    DownloadOutcome, Extractor, ExtractorEvent, ProbeInfo, ProgressPhase,
};
use media_fetch::pipeline::{MediaStorage, TaskStatusResponse};
use media_fetch::queue::{QueueConfig, TaskQueue};
use media_fetch::service::{DownloadService, Requester};
use media_fetch::{Error, Result};

/// What the fake extractor does when asked to download.
#[derive(Debug, Clone)]
pub enum FakeBehavior {
    /// Write these files into the output directory and succeed.
    Write(Vec<&'static str>),
    /// Succeed without producing anything.
    Nothing,
    /// Fail with an extractor fault.
    Fail(&'static str),
    /// Wait until cancelled.
    Block,
}

pub struct FakeExtractor {
    behavior: FakeBehavior,
    streams: Vec<RawStream>,
    pub seen: Mutex<Vec<JobConfiguration>>,
}

impl FakeExtractor {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            streams: sample_streams(),
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn probe(&self, url: &str) -> Result<ProbeInfo> {
        if url.contains("unsupported") {
            return Err(Error::extractor("Unsupported URL: ".to_string() + url));
        }
        Ok(ProbeInfo {
            id: Some("abc".to_string()),
            title: Some("Sample".to_string()),
            formats: self.streams.clone(),
        })
    }

    async fn download(
        &self,
        config: &JobConfiguration,
        output_dir: &Path,
        events: mpsc::Sender<ExtractorEvent>,
        cancel: CancellationToken,
    ) -> Result<DownloadOutcome> {
        self.seen.lock().push(config.clone());

        match &self.behavior {
            FakeBehavior::Write(files) => {
                for done in [25u64, 50, 100] {
                    let event =
                        ExtractorEvent::new(ProgressPhase::Downloading).with_bytes(done, 100);
                    let _ = events.send(event).await;
                }
                let _ = events.send(ExtractorEvent::new(ProgressPhase::Finished)).await;
                for name in files {
                    tokio::fs::write(output_dir.join(name), b"media")
                        .await
                        .map_err(Error::Io)?;
                }
                Ok(DownloadOutcome::Completed)
            }
            FakeBehavior::Nothing => Ok(DownloadOutcome::Completed),
            FakeBehavior::Fail(message) => Err(Error::extractor(*message)),
            FakeBehavior::Block => {
                cancel.cancelled().await;
                Err(Error::Cancelled("download cancelled".to_string()))
            }
        }
    }
}

fn stream(value: serde_json::Value) -> RawStream {
    serde_json::from_value(value).unwrap()
}

pub fn sample_streams() -> Vec<RawStream> {
    vec![
        stream(json!({
            "format_id": "18", "format_note": "360p", "ext": "mp4",
            "url": "https://cdn.example.com/18", "protocol": "https",
            "vcodec": "avc1", "acodec": "mp4a", "height": 360.0, "abr": 96.0, "vbr": 500.0
        })),
        stream(json!({
            "format_id": "137", "format_note": "1080p", "ext": "mp4",
            "url": "https://cdn.example.com/137", "protocol": "https",
            "vcodec": "avc1", "acodec": "none", "height": 1080.0, "vbr": 4000.0
        })),
        stream(json!({
            "format_id": "140", "format_note": "medium", "ext": "m4a",
            "url": "https://cdn.example.com/140", "protocol": "https",
            "vcodec": "none", "acodec": "mp4a", "abr": 128.0
        })),
        stream(json!({
            "format_id": "hls-720", "ext": "mp4", "protocol": "m3u8_native",
            "manifest_url": "https://cdn.example.com/master.m3u8",
            "url": "https://cdn.example.com/720.m3u8",
            "vcodec": "avc1", "acodec": "mp4a", "height": 720.0
        })),
    ]
}

/// Job log repository that remembers every status it wrote.
pub struct RecordingLogs {
    inner: SqlxDownloadLogRepository,
    writes: Mutex<Vec<(String, DownloadStatus)>>,
}

impl RecordingLogs {
    pub fn new(inner: SqlxDownloadLogRepository) -> Self {
        Self {
            inner,
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Statuses written for `log_id`, in order.
    pub fn statuses(&self, log_id: &str) -> Vec<DownloadStatus> {
        self.writes
            .lock()
            .iter()
            .filter(|(id, _)| id == log_id)
            .map(|(_, status)| *status)
            .collect()
    }

    fn record<T>(&self, id: &str, status: DownloadStatus, result: Result<T>) -> Result<T> {
        if result.is_ok() {
            self.writes.lock().push((id.to_string(), status));
        }
        result
    }
}

#[async_trait]
impl DownloadLogRepository for RecordingLogs {
    async fn create(&self, log: &DownloadLogDbModel) -> Result<()> {
        self.inner.create(log).await
    }

    async fn get(&self, id: &str) -> Result<DownloadLogDbModel> {
        self.inner.get(id).await
    }

    async fn find_by_task_id(&self, task_id: &str) -> Result<Option<DownloadLogDbModel>> {
        self.inner.find_by_task_id(task_id).await
    }

    async fn list_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<DownloadLogDbModel>> {
        self.inner.list_for_user(user_id, limit).await
    }

    async fn assign_task_id(&self, id: &str, task_id: &str) -> Result<()> {
        self.inner.assign_task_id(id, task_id).await
    }

    async fn update_status(&self, id: &str, status: DownloadStatus) -> Result<()> {
        let result = self.inner.update_status(id, status).await;
        self.record(id, status, result)
    }

    async fn complete(&self, id: &str, manifest: &[ManifestEntry]) -> Result<()> {
        let result = self.inner.complete(id, manifest).await;
        self.record(id, DownloadStatus::Success, result)
    }

    async fn fail(&self, id: &str, error_message: &str) -> Result<()> {
        let result = self.inner.fail(id, error_message).await;
        self.record(id, DownloadStatus::Failure, result)
    }

    async fn mark_dispatch_failed(&self, id: &str, reason: &str) -> Result<String> {
        let result = self.inner.mark_dispatch_failed(id, reason).await;
        self.record(id, DownloadStatus::Failure, result)
    }
}

pub struct TestEnv {
    pub pool: DbPool,
    pub logs: Arc<RecordingLogs>,
    pub extractor: Arc<FakeExtractor>,
    pub queue: Arc<TaskQueue>,
    pub service: Arc<DownloadService>,
    pub media_root: TempDir,
    _db_dir: TempDir,
}

impl TestEnv {
    pub async fn new(behavior: FakeBehavior) -> Self {
        Self::with_queue(behavior, QueueConfig::default()).await
    }

    pub async fn with_queue(behavior: FakeBehavior, queue_config: QueueConfig) -> Self {
        let db_dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", db_dir.path().join("test.db").display());
        let pool = init_pool_with_size(&url, 2).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let media_root = tempfile::tempdir().unwrap();
        let logs = Arc::new(RecordingLogs::new(SqlxDownloadLogRepository::new(pool.clone())));
        let extractor = Arc::new(FakeExtractor::new(behavior));
        let queue = Arc::new(TaskQueue::new(queue_config));
        let service = Arc::new(DownloadService::new(
            logs.clone(),
            extractor.clone(),
            queue.clone(),
            MediaStorage::new(media_root.path(), "/media/"),
        ));

        Self {
            pool,
            logs,
            extractor,
            queue,
            service,
            media_root,
            _db_dir: db_dir,
        }
    }

    /// A second service over the same database with a fresh queue.
    pub fn restarted_service(&self) -> DownloadService {
        DownloadService::new(
            self.logs.clone(),
            self.extractor.clone(),
            Arc::new(TaskQueue::new(QueueConfig::default())),
            MediaStorage::new(self.media_root.path(), "/media/"),
        )
    }

    pub async fn wait_for_terminal(&self, task_id: &str) -> TaskStatusResponse {
        for _ in 0..500 {
            let status = self.service.task_status(task_id).await.unwrap();
            if matches!(status.status.as_str(), "SUCCESS" | "FAILURE" | "REVOKED") {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} did not finish", task_id);
    }

    /// Wait until the job log reaches a terminal status.
    pub async fn wait_for_log(&self, log_id: &str) -> media_fetch::database::models::DownloadLogDbModel {
        for _ in 0..500 {
            let log = self.logs.get(log_id).await.unwrap();
            if log.status().is_terminal() {
                return log;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("log {} did not finish", log_id);
    }
}

pub fn alice() -> Requester {
    Requester {
        user_id: "1".to_string(),
        username: "alice".to_string(),
    }
}

pub fn bob() -> Requester {
    Requester {
        user_id: "2".to_string(),
        username: "bob".to_string(),
    }
}
