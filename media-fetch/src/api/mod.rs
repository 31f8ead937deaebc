//! REST API server module.
//!
//! Exposes download submission, format probing, task polling and job log
//! access over HTTP, plus static serving of finished downloads.

pub mod error;
pub mod jwt;
pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
