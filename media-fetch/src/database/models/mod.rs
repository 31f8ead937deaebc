//! Database models for media-fetch.
//!
//! These models map directly to the database schema and handle
//! serialization/deserialization of JSON fields.

pub mod download_log;

pub use download_log::*;
