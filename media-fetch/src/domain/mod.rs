//! Domain layer for media-fetch.
//!
//! Value types shared by the format resolver, the option translator and the
//! job pipeline.

pub mod format;
pub mod job;

pub use format::{FormatDescriptor, MediaType, RawStream};
pub use job::{DownloadStatus, JobConfiguration, ManifestEntry, PostProcessor};
