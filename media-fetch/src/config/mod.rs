//! Process configuration.
//!
//! Everything is read from the environment (after `.env` is loaded by
//! `main`). Malformed numeric values fall back to their defaults.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::api::server::ApiServerConfig;
use crate::extractor::YtDlpConfig;
use crate::pipeline::MediaStorage;
use crate::queue::QueueConfig;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:media-fetch.db?mode=rwc";
pub const DEFAULT_JWT_ISSUER: &str = "media-fetch";
pub const DEFAULT_JWT_AUDIENCE: &str = "media-fetch-api";

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Directory holding `downloads/<user>/<task_id>/`.
    pub media_root: PathBuf,
    /// Public URL prefix that serves `media_root`.
    pub media_url: String,
    pub ytdlp_path: String,
    pub ffmpeg_location: Option<String>,
    pub max_concurrent_jobs: usize,
    pub job_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub bind_address: String,
    pub port: u16,
    /// Authentication is unavailable without a secret.
    pub jwt_secret: Option<String>,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub log_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            media_root: PathBuf::from("./media"),
            media_url: "/media/".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
            ffmpeg_location: None,
            max_concurrent_jobs: 4,
            job_timeout_secs: 3600,
            probe_timeout_secs: 180,
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
            jwt_secret: None,
            jwt_issuer: DEFAULT_JWT_ISSUER.to_string(),
            jwt_audience: DEFAULT_JWT_AUDIENCE.to_string(),
            log_dir: PathBuf::from("./logs"),
        }
    }
}

impl AppConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            database_url: text("DATABASE_URL").unwrap_or(defaults.database_url),
            media_root: text("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.media_root),
            media_url: text("MEDIA_URL").unwrap_or(defaults.media_url),
            ytdlp_path: text("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            ffmpeg_location: text("FFMPEG_LOCATION"),
            max_concurrent_jobs: parse_or_default(
                "MAX_CONCURRENT_JOBS",
                text("MAX_CONCURRENT_JOBS"),
                defaults.max_concurrent_jobs,
            ),
            job_timeout_secs: parse_or_default(
                "JOB_TIMEOUT_SECS",
                text("JOB_TIMEOUT_SECS"),
                defaults.job_timeout_secs,
            ),
            probe_timeout_secs: parse_or_default(
                "PROBE_TIMEOUT_SECS",
                text("PROBE_TIMEOUT_SECS"),
                defaults.probe_timeout_secs,
            ),
            bind_address: text("API_BIND_ADDRESS").unwrap_or(defaults.bind_address),
            port: parse_or_default("API_PORT", text("API_PORT"), defaults.port),
            jwt_secret: text("JWT_SECRET"),
            jwt_issuer: text("JWT_ISSUER").unwrap_or(defaults.jwt_issuer),
            jwt_audience: text("JWT_AUDIENCE").unwrap_or(defaults.jwt_audience),
            log_dir: text("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_workers: self.max_concurrent_jobs.max(1),
            job_timeout_secs: self.job_timeout_secs,
            ..QueueConfig::default()
        }
    }

    pub fn ytdlp_config(&self) -> YtDlpConfig {
        YtDlpConfig {
            binary_path: self.ytdlp_path.clone(),
            ffmpeg_location: self.ffmpeg_location.clone(),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
        }
    }

    pub fn server_config(&self) -> ApiServerConfig {
        ApiServerConfig {
            bind_address: self.bind_address.clone(),
            port: self.port,
            ..ApiServerConfig::default()
        }
    }

    pub fn storage(&self) -> MediaStorage {
        MediaStorage::new(self.media_root.clone(), self.media_url.clone())
    }
}

fn parse_or_default<T: FromStr + Copy + std::fmt::Display>(
    key: &str,
    raw: Option<String>,
    default: T,
) -> T {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            warn!("Invalid value '{}' for {}, using default {}", raw, key, default);
            default
        }
    }
}
