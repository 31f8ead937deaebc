//! media-fetch library crate.
//!
//! Asynchronous media download service: clients pick a format, submit a job,
//! and poll its status while an external extractor does the work.

pub mod api;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod extractor;
pub mod formats;
pub mod logging;
pub mod options;
pub mod pipeline;
pub mod queue;
pub mod service;
pub mod utils;

pub use error::{Error, Result};
