//! Repository layer for database access.

pub mod download_log;

pub use download_log::*;
