//! Extractor events → task progress metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::extractor::{ExtractorEvent, ProgressPhase};
use crate::queue::{TaskContext, TaskState};

/// Progress metadata published on a task's `info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub status: String,
    pub progress: u8,
}

impl ProgressInfo {
    pub fn new(status: impl Into<String>, progress: u8) -> Self {
        Self {
            status: status.into(),
            progress,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({ "status": self.status, "progress": self.progress })
    }
}

/// Where relayed progress ends up.
pub trait ProgressSink: Send + Sync {
    /// Publish progress. Returns `false` if it was not applied.
    fn publish(&self, info: &ProgressInfo) -> bool;

    /// Whether the task already reached a terminal state.
    fn is_terminal(&self) -> bool;

    /// Ask the running extraction to stop.
    fn request_stop(&self);
}

impl ProgressSink for TaskContext {
    fn publish(&self, info: &ProgressInfo) -> bool {
        self.update_state(TaskState::Progress, info.to_value())
    }

    fn is_terminal(&self) -> bool {
        TaskContext::is_terminal(self)
    }

    fn request_stop(&self) {
        self.cancellation_token().cancel();
    }
}

/// Turns raw extractor events into throttled progress updates.
pub struct ProgressRelay<'a, S: ProgressSink + ?Sized> {
    sink: &'a S,
}

impl<'a, S: ProgressSink + ?Sized> ProgressRelay<'a, S> {
    pub fn new(sink: &'a S) -> Self {
        Self { sink }
    }

    /// Handle one event, returning the update that was published, if any.
    pub fn relay(&self, event: &ExtractorEvent) -> Option<ProgressInfo> {
        if self.sink.is_terminal() {
            debug!("Task already terminal, stopping extraction");
            self.sink.request_stop();
            return None;
        }

        let info = match event.phase {
            ProgressPhase::Downloading => downloading_info(event)?,
            ProgressPhase::Finished => {
                let suffix = match event.playlist_position() {
                    Some((index, count)) => format!(" (Item {}/{})", index, count),
                    None => String::new(),
                };
                ProgressInfo::new(format!("Processing Item{}...", suffix), 99)
            }
            ProgressPhase::Error => {
                warn!("Extractor reported an error while downloading");
                return None;
            }
        };

        if !self.sink.publish(&info) {
            debug!(status = %info.status, "Progress update not applied");
            return None;
        }
        Some(info)
    }
}

/// Progress for a `downloading` event; `None` when throttled or when either
/// byte count is unknown or zero.
fn downloading_info(event: &ExtractorEvent) -> Option<ProgressInfo> {
    let downloaded = event.downloaded_bytes.filter(|b| *b > 0)?;
    let total = event.total().filter(|b| *b > 0)?;

    let percent = (downloaded.saturating_mul(100) / total).min(100) as u8;
    if percent % 5 != 0 {
        return None;
    }

    let status = match event.playlist_position() {
        Some((index, count)) => format!(
            "Downloading Playlist Item {} of {} (Item {}/{})",
            index, count, index, count
        ),
        None => "Downloading...".to_string(),
    };
    Some(ProgressInfo::new(status, percent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct RecordingSink {
        published: Mutex<Vec<ProgressInfo>>,
        terminal: AtomicBool,
        stopped: AtomicBool,
    }

    impl ProgressSink for RecordingSink {
        fn publish(&self, info: &ProgressInfo) -> bool {
            self.published.lock().push(info.clone());
            true
        }

        fn is_terminal(&self) -> bool {
            self.terminal.load(Ordering::SeqCst)
        }

        fn request_stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    fn downloading(downloaded: u64, total: u64) -> ExtractorEvent {
        ExtractorEvent::new(ProgressPhase::Downloading).with_bytes(downloaded, total)
    }

    #[test]
    fn test_throttles_to_five_percent_steps() {
        let sink = RecordingSink::default();
        let relay = ProgressRelay::new(&sink);

        assert!(relay.relay(&downloading(7, 100)).is_none());
        assert_eq!(
            relay.relay(&downloading(10, 100)),
            Some(ProgressInfo::new("Downloading...", 10))
        );
        assert!(relay.relay(&downloading(33, 100)).is_none());
        assert_eq!(relay.relay(&downloading(100, 100)).unwrap().progress, 100);
        assert_eq!(sink.published.lock().len(), 2);
    }

    #[test]
    fn test_unknown_size_publishes_nothing() {
        let sink = RecordingSink::default();
        let relay = ProgressRelay::new(&sink);
        let event = ExtractorEvent {
            downloaded_bytes: Some(10),
            ..ExtractorEvent::new(ProgressPhase::Downloading)
        };
        assert!(relay.relay(&event).is_none());
    }

    #[test]
    fn test_zero_byte_counts_publish_nothing() {
        let sink = RecordingSink::default();
        let relay = ProgressRelay::new(&sink);
        assert!(relay.relay(&downloading(0, 0)).is_none());
        assert!(relay.relay(&downloading(10, 0)).is_none());
        assert!(relay.relay(&downloading(0, 100)).is_none());
        assert!(sink.published.lock().is_empty());
    }

    #[test]
    fn test_estimate_used_when_total_missing() {
        let sink = RecordingSink::default();
        let relay = ProgressRelay::new(&sink);
        let event = ExtractorEvent {
            downloaded_bytes: Some(50),
            total_bytes_estimate: Some(200),
            ..ExtractorEvent::new(ProgressPhase::Downloading)
        };
        assert_eq!(relay.relay(&event).unwrap().progress, 25);
    }

    #[test]
    fn test_playlist_messages() {
        let sink = RecordingSink::default();
        let relay = ProgressRelay::new(&sink);

        let info = relay.relay(&downloading(50, 100).with_playlist(2, 5)).unwrap();
        assert_eq!(info.status, "Downloading Playlist Item 2 of 5 (Item 2/5)");

        let finished = ExtractorEvent::new(ProgressPhase::Finished).with_playlist(2, 5);
        assert_eq!(
            relay.relay(&finished),
            Some(ProgressInfo::new("Processing Item (Item 2/5)...", 99))
        );
        assert_eq!(
            relay.relay(&ExtractorEvent::new(ProgressPhase::Finished)),
            Some(ProgressInfo::new("Processing Item...", 99))
        );
    }

    #[test]
    fn test_error_phase_not_published() {
        let sink = RecordingSink::default();
        let relay = ProgressRelay::new(&sink);
        assert!(relay.relay(&ExtractorEvent::new(ProgressPhase::Error)).is_none());
        assert!(sink.published.lock().is_empty());
    }

    #[test]
    fn test_terminal_task_requests_stop() {
        let sink = RecordingSink::default();
        sink.terminal.store(true, Ordering::SeqCst);
        let relay = ProgressRelay::new(&sink);

        assert!(relay.relay(&downloading(50, 100)).is_none());
        assert!(sink.stopped.load(Ordering::SeqCst));
        assert!(sink.published.lock().is_empty());
    }
}
