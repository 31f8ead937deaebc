//! Download job pipeline.
//!
//! The executor drives a single job; progress, output classification and the
//! polling view are kept in their own modules.

pub mod classify;
pub mod executor;
pub mod progress;
pub mod status;

pub use classify::{EntryClass, classify_entry};
pub use executor::{DownloadJob, JobExecutor, MediaStorage, collect_deliverables};
pub use progress::{ProgressInfo, ProgressRelay, ProgressSink};
pub use status::{TaskStatusResponse, build_status};
