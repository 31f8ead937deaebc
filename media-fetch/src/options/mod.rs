//! Translation of user download parameters into a [`JobConfiguration`].
//!
//! [`JobConfiguration`]: crate::domain::JobConfiguration

pub mod template;
pub mod translator;

pub use template::{DEFAULT_PLAYLIST_TEMPLATE, DEFAULT_SINGLE_TEMPLATE, resolve_output_template};
pub use translator::{CONVERT_MARKER, JobRequest, build_job_configuration};
