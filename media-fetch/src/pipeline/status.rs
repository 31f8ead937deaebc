//! Polling view of a task: queue-native state merged with the job log.

use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::database::models::DownloadLogDbModel;
use crate::domain::DownloadStatus;
use crate::queue::{TaskSnapshot, TaskState};

/// Response body of a task status poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: String,
    pub info: Option<Value>,
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

/// Build the status response for `task_id`.
///
/// `snapshot` is the queue's view, `log` the job log bearing this task id.
/// The queue wins when it still knows the task.
pub fn build_status(
    task_id: &str,
    snapshot: Option<TaskSnapshot>,
    log: Option<&DownloadLogDbModel>,
) -> TaskStatusResponse {
    match (snapshot, log) {
        (Some(snapshot), _) => from_snapshot(task_id, snapshot),
        (None, Some(log)) => from_log(task_id, log),
        (None, None) => pending(task_id),
    }
}

fn pending(task_id: &str) -> TaskStatusResponse {
    TaskStatusResponse {
        task_id: task_id.to_string(),
        status: TaskState::Pending.as_str().to_string(),
        info: None,
        result: None,
        status_message: None,
    }
}

fn from_snapshot(task_id: &str, snapshot: TaskSnapshot) -> TaskStatusResponse {
    let info = snapshot.info.map(|info| {
        if is_flat_mapping(&info) {
            info
        } else {
            warn!(task_id = %task_id, "Task info is not a flat mapping");
            json!({ "error": "Could not retrieve metadata" })
        }
    });

    let mut response = TaskStatusResponse {
        task_id: task_id.to_string(),
        status: snapshot.state.as_str().to_string(),
        info,
        result: None,
        status_message: None,
    };

    match snapshot.state {
        TaskState::Success => response.result = snapshot.result,
        TaskState::Failure => {
            response.result = snapshot
                .error
                .map(|err| json!({ "exc_type": err.exc_type, "exc_message": err.exc_message }));
            response.status_message = response
                .info
                .as_ref()
                .and_then(|info| info.get("status"))
                .and_then(Value::as_str)
                .map(str::to_string);
        }
        _ => {}
    }
    response
}

/// Fallback for tasks the queue no longer tracks.
fn from_log(task_id: &str, log: &DownloadLogDbModel) -> TaskStatusResponse {
    match log.status() {
        DownloadStatus::Success => {
            let result = match log.manifest() {
                Ok(manifest) => manifest.map(|entries| json!(entries)),
                Err(e) => {
                    warn!(log_id = %log.id, "Stored manifest is unreadable: {}", e);
                    None
                }
            };
            TaskStatusResponse {
                task_id: task_id.to_string(),
                status: TaskState::Success.as_str().to_string(),
                info: None,
                result,
                status_message: None,
            }
        }
        DownloadStatus::Failure => {
            let message = log.error_message.as_deref().unwrap_or("Unknown error");
            let (exc_type, exc_message) = split_fault(message);
            TaskStatusResponse {
                task_id: task_id.to_string(),
                status: TaskState::Failure.as_str().to_string(),
                info: None,
                result: Some(json!({ "exc_type": exc_type, "exc_message": exc_message })),
                status_message: None,
            }
        }
        _ => pending(task_id),
    }
}

/// Split a stored `"{kind}: {message}"` error back into its parts.
fn split_fault(message: &str) -> (&str, &str) {
    if let Some(reason) = message.strip_prefix("Queue fail:") {
        return ("QueueDispatchFault", reason.trim());
    }
    match message.split_once(": ") {
        Some((kind, rest)) if !kind.is_empty() && !kind.contains(char::is_whitespace) => {
            (kind, rest)
        }
        _ => ("Error", message),
    }
}

fn is_flat_mapping(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| map.values().all(|v| !v.is_object() && !v.is_array()))
}
