//! Minimal in-process task queue.
//!
//! Tasks run on a bounded set of tokio workers. Every task owns a status slot
//! (`state`, `info`, `result`) that pollers read while the running task
//! writes it. Queue state lives in memory only.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{Error, Result};

/// How long a task gets to wind down after its deadline before it is dropped.
const CANCEL_GRACE: Duration = Duration::from_secs(10);

/// Queue-native task state.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Started,
    Progress,
    Success,
    Failure,
    Revoked,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Started => "STARTED",
            Self::Progress => "PROGRESS",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Revoked => "REVOKED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Revoked)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure recorded for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub exc_type: String,
    pub exc_message: String,
}

impl From<&Error> for TaskError {
    fn from(err: &Error) -> Self {
        Self {
            exc_type: err.kind().to_string(),
            exc_message: err.to_string(),
        }
    }
}

/// Point-in-time view of a task slot.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub state: TaskState,
    /// Last progress metadata published by the task.
    pub info: Option<Value>,
    /// Return value of a successful task.
    pub result: Option<Value>,
    pub error: Option<TaskError>,
}

struct TaskSlot {
    state: TaskState,
    info: Option<Value>,
    result: Option<Value>,
    error: Option<TaskError>,
    cancel: CancellationToken,
    finished_at: Option<Instant>,
}

impl TaskSlot {
    fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            state: self.state,
            info: self.info.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }

    fn finish(&mut self, state: TaskState) {
        self.state = state;
        self.finished_at = Some(Instant::now());
    }
}

type Slots = Arc<DashMap<String, TaskSlot>>;

/// Handle given to a running task.
#[derive(Clone)]
pub struct TaskContext {
    task_id: String,
    slots: Slots,
    cancel: CancellationToken,
    deadline_exceeded: Arc<AtomicBool>,
}

impl TaskContext {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Publish a new state and progress metadata.
    ///
    /// Ignored once the task is terminal (e.g. revoked). Returns whether the
    /// update was applied.
    pub fn update_state(&self, state: TaskState, info: Value) -> bool {
        match self.slots.get_mut(&self.task_id) {
            Some(mut slot) if !slot.state.is_terminal() => {
                slot.state = state;
                slot.info = Some(info);
                true
            }
            _ => false,
        }
    }

    /// Current queue-native state of this task.
    pub fn state(&self) -> TaskState {
        self.slots
            .get(&self.task_id)
            .map(|slot| slot.state)
            .unwrap_or(TaskState::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Cancelled when the task is revoked, exceeds its deadline or the queue shuts down.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.deadline_exceeded.load(Ordering::SeqCst)
    }
}

/// A unit of work accepted by [`TaskQueue`].
#[async_trait]
pub trait QueuedTask: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Run the task. The returned value becomes the task result.
    async fn run(&self, ctx: TaskContext) -> Result<Value>;

    /// Called instead of completing `run` when the task is revoked or shut
    /// down before it starts, or dropped after its deadline grace period.
    async fn abandon(&self, _reason: &Error) {}
}

/// Task queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum concurrently running tasks.
    pub max_workers: usize,
    /// Per-task deadline in seconds.
    pub job_timeout_secs: u64,
    /// How long finished task slots stay queryable.
    pub result_ttl_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            job_timeout_secs: 3600,
            result_ttl_secs: 24 * 3600,
        }
    }
}

/// Bounded in-process task queue.
pub struct TaskQueue {
    config: QueueConfig,
    slots: Slots,
    semaphore: Arc<Semaphore>,
    cancellation_token: CancellationToken,
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
}

impl TaskQueue {
    pub fn new(config: QueueConfig) -> Self {
        info!(
            "Task queue started with {} max workers, {}s job deadline",
            config.max_workers, config.job_timeout_secs
        );
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_workers.max(1))),
            config,
            slots: Arc::new(DashMap::new()),
            cancellation_token: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
        }
    }

    /// Accept a task and return its id. The task starts once a worker is free.
    pub fn submit(&self, task: Box<dyn QueuedTask>) -> Result<String> {
        if self.cancellation_token.is_cancelled() {
            return Err(Error::QueueDispatch("task queue is shut down".to_string()));
        }
        self.prune_finished();

        let task_id = uuid::Uuid::new_v4().to_string();
        let cancel = self.cancellation_token.child_token();
        let ctx = TaskContext {
            task_id: task_id.clone(),
            slots: self.slots.clone(),
            cancel: cancel.clone(),
            deadline_exceeded: Arc::new(AtomicBool::new(false)),
        };

        let mut tasks = self.tasks.lock();
        let Some(join_set) = tasks.as_mut() else {
            return Err(Error::QueueDispatch("task queue is shut down".to_string()));
        };
        while join_set.try_join_next().is_some() {}

        self.slots.insert(
            task_id.clone(),
            TaskSlot {
                state: TaskState::Pending,
                info: None,
                result: None,
                error: None,
                cancel,
                finished_at: None,
            },
        );

        let semaphore = self.semaphore.clone();
        let job_timeout = Duration::from_secs(self.config.job_timeout_secs);
        join_set.spawn(run_task(task, ctx, semaphore, job_timeout));

        debug!(task_id = %task_id, "Task submitted");
        Ok(task_id)
    }

    /// Snapshot of a task, or `None` when the id is unknown (or expired).
    pub fn status(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.slots.get(task_id).map(|slot| slot.snapshot())
    }

    /// Mark a task REVOKED and signal it to stop.
    ///
    /// Terminal tasks are left untouched; their current state is returned.
    pub fn revoke(&self, task_id: &str) -> Result<TaskState> {
        let mut slot = self
            .slots
            .get_mut(task_id)
            .ok_or_else(|| Error::not_found("Task", task_id))?;
        if slot.state.is_terminal() {
            return Ok(slot.state);
        }
        slot.finish(TaskState::Revoked);
        slot.cancel.cancel();
        info!(task_id = %task_id, "Task revoked");
        Ok(TaskState::Revoked)
    }

    /// Stop accepting tasks, cancel running ones and wait for workers to exit.
    pub async fn shutdown(&self) {
        info!("Stopping task queue");
        self.cancellation_token.cancel();

        let join_set = {
            let mut tasks = self.tasks.lock();
            tasks.take()
        };

        if let Some(mut join_set) = join_set {
            while join_set.join_next().await.is_some() {}
        }
        info!("Task queue stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.cancellation_token.is_cancelled()
    }

    fn prune_finished(&self) {
        let ttl = Duration::from_secs(self.config.result_ttl_secs);
        self.slots
            .retain(|_, slot| slot.finished_at.is_none_or(|at| at.elapsed() < ttl));
    }
}

async fn run_task(
    task: Box<dyn QueuedTask>,
    ctx: TaskContext,
    semaphore: Arc<Semaphore>,
    job_timeout: Duration,
) {
    let task_id = ctx.task_id.clone();
    let name = task.name().to_string();

    // Revocation and shutdown both cancel the task token.
    let permit = tokio::select! {
        permit = semaphore.acquire_owned() => permit.ok(),
        _ = ctx.cancel.cancelled() => None,
    };
    let _permit = match permit {
        Some(permit) if !ctx.is_terminal() && !ctx.cancel.is_cancelled() => permit,
        _ => {
            debug!(task_id = %task_id, "Task stopped before start");
            abandon(task.as_ref(), &ctx, not_started_reason(&ctx)).await;
            return;
        }
    };

    debug!(task_id = %task_id, task = %name, "Task running");
    let mut run = task.run(ctx.clone());

    let outcome = tokio::select! {
        res = &mut run => res,
        _ = tokio::time::sleep(job_timeout) => {
            warn!(
                task_id = %task_id,
                "Task exceeded {}s deadline, cancelling",
                job_timeout.as_secs()
            );
            ctx.deadline_exceeded.store(true, Ordering::SeqCst);
            ctx.cancel.cancel();
            match tokio::time::timeout(CANCEL_GRACE, &mut run).await {
                Ok(res) => res,
                Err(_) => {
                    drop(run);
                    let reason = Error::Cancelled(format!(
                        "job exceeded its deadline of {}s",
                        job_timeout.as_secs()
                    ));
                    warn!(task_id = %task_id, "Task ignored cancellation, dropping it");
                    abandon(task.as_ref(), &ctx, reason).await;
                    return;
                }
            }
        }
    };

    let Some(mut slot) = ctx.slots.get_mut(&task_id) else {
        return;
    };
    if slot.state == TaskState::Revoked {
        return;
    }
    match outcome {
        Ok(value) => {
            slot.result = Some(value);
            slot.finish(TaskState::Success);
            debug!(task_id = %task_id, "Task succeeded");
        }
        Err(e) => {
            error!(task_id = %task_id, task = %name, "Task failed: {}", e);
            slot.error = Some(TaskError::from(&e));
            slot.finish(TaskState::Failure);
        }
    }
}

fn not_started_reason(ctx: &TaskContext) -> Error {
    if ctx.state() == TaskState::Revoked {
        Error::Cancelled("task revoked".to_string())
    } else {
        Error::Cancelled("task queue is shut down".to_string())
    }
}

/// Record `reason` on a non-terminal slot and let the task clean up.
async fn abandon(task: &dyn QueuedTask, ctx: &TaskContext, reason: Error) {
    if let Some(mut slot) = ctx.slots.get_mut(&ctx.task_id)
        && !slot.state.is_terminal()
    {
        slot.error = Some(TaskError::from(&reason));
        slot.finish(TaskState::Failure);
    }
    task.abandon(&reason).await;
}
