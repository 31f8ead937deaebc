//! Download log repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::DownloadLogDbModel;
use crate::domain::{DownloadStatus, ManifestEntry};
use crate::{Error, Result};

/// Prefix of the synthetic task id written when queue dispatch fails.
pub const DISPATCH_FAILED_TASK_PREFIX: &str = "FAIL_Q_";

/// Download log repository trait.
///
/// Status writes are validated against [`DownloadStatus::can_transition_to`], so
/// a log never moves backwards and never leaves a terminal status.
#[async_trait]
pub trait DownloadLogRepository: Send + Sync {
    async fn create(&self, log: &DownloadLogDbModel) -> Result<()>;
    async fn get(&self, id: &str) -> Result<DownloadLogDbModel>;
    async fn find_by_task_id(&self, task_id: &str) -> Result<Option<DownloadLogDbModel>>;
    /// Logs the user submitted or receives, newest first.
    async fn list_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<DownloadLogDbModel>>;
    /// Record the queue task id. Fails if one is already set.
    async fn assign_task_id(&self, id: &str, task_id: &str) -> Result<()>;
    async fn update_status(&self, id: &str, status: DownloadStatus) -> Result<()>;
    /// Move to SUCCESS and store the manifest.
    async fn complete(&self, id: &str, manifest: &[ManifestEntry]) -> Result<()>;
    /// Move to FAILURE and store the error summary.
    async fn fail(&self, id: &str, error_message: &str) -> Result<()>;
    /// Move to FAILURE after queue dispatch failed, assigning a synthetic task id.
    ///
    /// Returns the synthetic task id.
    async fn mark_dispatch_failed(&self, id: &str, reason: &str) -> Result<String>;
}

/// SQLx implementation of DownloadLogRepository.
pub struct SqlxDownloadLogRepository {
    pool: SqlitePool,
}

impl SqlxDownloadLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Validate `id`'s current status against `target` and return the status
    /// the guarded UPDATE must still observe.
    async fn check_transition(&self, id: &str, target: DownloadStatus) -> Result<DownloadStatus> {
        let current = self.get(id).await?.status();
        current.transition_to(target)?;
        Ok(current)
    }

    fn lost_race(id: &str, expected: DownloadStatus, target: DownloadStatus) -> Error {
        tracing::warn!(
            log_id = %id,
            expected = %expected,
            target = %target,
            "Download log changed concurrently; status write skipped"
        );
        Error::InvalidStateTransition {
            from: expected.as_str().to_string(),
            to: target.as_str().to_string(),
        }
    }
}

#[async_trait]
impl DownloadLogRepository for SqlxDownloadLogRepository {
    async fn create(&self, log: &DownloadLogDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO download_log (
                id, owner_user_id, target_user_id, url, format_selector, media_type,
                is_playlist, task_id, status, result_manifest, error_message,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.id)
        .bind(&log.owner_user_id)
        .bind(&log.target_user_id)
        .bind(&log.url)
        .bind(&log.format_selector)
        .bind(&log.media_type)
        .bind(log.is_playlist)
        .bind(&log.task_id)
        .bind(&log.status)
        .bind(&log.result_manifest)
        .bind(&log.error_message)
        .bind(&log.created_at)
        .bind(&log.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<DownloadLogDbModel> {
        sqlx::query_as::<_, DownloadLogDbModel>("SELECT * FROM download_log WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("DownloadLog", id))
    }

    async fn find_by_task_id(&self, task_id: &str) -> Result<Option<DownloadLogDbModel>> {
        let log =
            sqlx::query_as::<_, DownloadLogDbModel>("SELECT * FROM download_log WHERE task_id = ?")
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(log)
    }

    async fn list_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<DownloadLogDbModel>> {
        let logs = sqlx::query_as::<_, DownloadLogDbModel>(
            r#"
            SELECT * FROM download_log
            WHERE owner_user_id = ? OR target_user_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }

    async fn assign_task_id(&self, id: &str, task_id: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE download_log SET task_id = ?, updated_at = ? WHERE id = ? AND task_id IS NULL",
        )
        .bind(task_id)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let existing = self.get(id).await?;
            return Err(Error::validation(format!(
                "download log {} already has task id {}",
                id,
                existing.task_id.unwrap_or_default()
            )));
        }
        Ok(())
    }

    async fn update_status(&self, id: &str, status: DownloadStatus) -> Result<()> {
        let current = self.check_transition(id, status).await?;
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE download_log SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(status.as_str())
        .bind(&now)
        .bind(id)
        .bind(current.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::lost_race(id, current, status));
        }
        Ok(())
    }

    async fn complete(&self, id: &str, manifest: &[ManifestEntry]) -> Result<()> {
        let current = self.check_transition(id, DownloadStatus::Success).await?;
        let manifest_json = serde_json::to_string(manifest)?;
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE download_log
            SET status = 'SUCCESS', result_manifest = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(&manifest_json)
        .bind(&now)
        .bind(id)
        .bind(current.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::lost_race(id, current, DownloadStatus::Success));
        }
        Ok(())
    }

    async fn fail(&self, id: &str, error_message: &str) -> Result<()> {
        let current = self.check_transition(id, DownloadStatus::Failure).await?;
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE download_log
            SET status = 'FAILURE', error_message = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(error_message)
        .bind(&now)
        .bind(id)
        .bind(current.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::lost_race(id, current, DownloadStatus::Failure));
        }
        Ok(())
    }

    async fn mark_dispatch_failed(&self, id: &str, reason: &str) -> Result<String> {
        let current = self.check_transition(id, DownloadStatus::Failure).await?;
        let synthetic = format!("{}{}", DISPATCH_FAILED_TASK_PREFIX, uuid::Uuid::new_v4());
        let message = format!("Queue fail: {}", reason);
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE download_log
            SET status = 'FAILURE', error_message = ?, task_id = COALESCE(task_id, ?), updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(&message)
        .bind(&synthetic)
        .bind(&now)
        .bind(id)
        .bind(current.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::lost_race(id, current, DownloadStatus::Failure));
        }
        Ok(synthetic)
    }
}
