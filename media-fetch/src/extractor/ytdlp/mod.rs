//! yt-dlp adapter.
//!
//! yt-dlp runs as a child process. Progress is read from stdout through a
//! custom progress template; stderr is kept (bounded) for error reporting.

pub mod args;
pub mod progress;

use std::collections::VecDeque;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{DownloadOutcome, Extractor, ExtractorEvent, ProbeInfo};
use crate::domain::JobConfiguration;
use crate::{Error, Result};

use self::args::{build_download_args, build_probe_args};
use self::progress::{parse_error_line, parse_progress_line};

/// Exit code yt-dlp uses when `--max-downloads` stopped the run.
pub const EXIT_MAX_DOWNLOADS: i32 = 101;

/// Stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

/// yt-dlp adapter configuration.
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    pub binary_path: String,
    pub ffmpeg_location: Option<String>,
    pub probe_timeout: Duration,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary_path: "yt-dlp".to_string(),
            ffmpeg_location: None,
            probe_timeout: Duration::from_secs(180),
        }
    }
}

/// [`Extractor`] backed by the yt-dlp CLI.
pub struct YtDlpExtractor {
    config: YtDlpConfig,
}

impl YtDlpExtractor {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    fn command(&self) -> Command {
        tokio_command(&self.config.binary_path)
    }
}

/// Create a `tokio::process::Command` that opens no console window on Windows.
fn tokio_command(program: impl AsRef<OsStr>) -> Command {
    #[cfg_attr(not(windows), allow(unused_mut))]
    let mut cmd = Command::new(program);
    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// Most useful error text from captured stderr: the last `ERROR:` line, else the last line.
fn summarize_stderr(lines: &VecDeque<String>) -> String {
    lines
        .iter()
        .rev()
        .find_map(|l| parse_error_line(l))
        .map(str::to_string)
        .or_else(|| lines.back().cloned())
        .unwrap_or_else(|| "no error output".to_string())
}

async fn collect_stderr<R: AsyncRead + Unpin>(stderr: R) -> VecDeque<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("yt-dlp stderr: {}", line);
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail
}

/// Map an exit code to an outcome.
///
/// Playlist runs with `ignore_errors` exit with 1 when some items failed;
/// that still counts as completed and verification decides the result.
fn classify_exit(
    code: Option<i32>,
    config: &JobConfiguration,
    stderr: &VecDeque<String>,
) -> Result<DownloadOutcome> {
    match code {
        Some(0) => Ok(DownloadOutcome::Completed),
        Some(EXIT_MAX_DOWNLOADS) => Ok(DownloadOutcome::MaxDownloadsReached),
        Some(1) if config.ignore_errors => {
            warn!(
                url = %config.source_url,
                "yt-dlp reported errors for some playlist items: {}",
                summarize_stderr(stderr)
            );
            Ok(DownloadOutcome::Completed)
        }
        Some(code) => Err(Error::extractor(format!(
            "yt-dlp exited with code {}: {}",
            code,
            summarize_stderr(stderr)
        ))),
        None => Err(Error::extractor(format!(
            "yt-dlp terminated by signal: {}",
            summarize_stderr(stderr)
        ))),
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn probe(&self, url: &str) -> Result<ProbeInfo> {
        let mut cmd = self.command();
        cmd.args(build_probe_args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| Error::extractor(format!("Failed to spawn yt-dlp: {}", e)))?;

        let output = tokio::time::timeout(self.config.probe_timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::extractor(format!(
                    "Timeout fetching formats ({}s)",
                    self.config.probe_timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::extractor(format!("Failed to run yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr: VecDeque<String> = String::from_utf8_lossy(&output.stderr)
                .lines()
                .map(str::to_string)
                .collect();
            return Err(Error::extractor(summarize_stderr(&stderr)));
        }

        let info: ProbeInfo = serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::extractor(format!("Unreadable yt-dlp metadata: {}", e)))?;
        debug!(url = %url, formats = info.formats.len(), "Probe finished");
        Ok(info)
    }

    async fn download(
        &self,
        config: &JobConfiguration,
        output_dir: &Path,
        events: mpsc::Sender<ExtractorEvent>,
        cancel: CancellationToken,
    ) -> Result<DownloadOutcome> {
        let args = build_download_args(config, output_dir, self.config.ffmpeg_location.as_deref());
        info!(url = %config.source_url, dir = %output_dir.display(), "Starting yt-dlp");
        debug!("yt-dlp args: {:?}", args);

        let mut cmd = self.command();
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::extractor(format!("Failed to spawn yt-dlp: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Other("Failed to capture yt-dlp stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Other("Failed to capture yt-dlp stderr".to_string()))?;

        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut last_position: Option<(u32, u32)> = None;
            while let Ok(Some(line)) = lines.next_line().await {
                let Some(mut event) = parse_progress_line(&line) else {
                    debug!("yt-dlp: {}", line);
                    continue;
                };
                match event.playlist_position() {
                    Some(position) => last_position = Some(position),
                    None => {
                        if let Some((index, count)) = last_position {
                            event = event.with_playlist(index, count);
                        }
                    }
                }
                // A closed receiver is ignored; stdout must keep draining.
                let _ = events.send(event).await;
            }
        });
        let stderr_task = tokio::spawn(collect_stderr(stderr));

        let status = tokio::select! {
            status = child.wait() => status
                .map_err(|e| Error::extractor(format!("yt-dlp process failed: {}", e)))?,
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill yt-dlp: {}", e);
                }
                let _ = stdout_task.await;
                let _ = stderr_task.await;
                return Err(Error::Cancelled("download cancelled".to_string()));
            }
        };

        let _ = stdout_task.await;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        classify_exit(status.code(), config, &stderr_tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MediaType;
    use crate::options::{JobRequest, build_job_configuration};

    fn config(is_playlist: bool) -> JobConfiguration {
        build_job_configuration(JobRequest {
            url: "https://example.com/v",
            format_code: "best",
            media_type: MediaType::Video,
            is_playlist,
            filename_template: None,
        })
    }

    fn tail(lines: &[&str]) -> VecDeque<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exit_code_mapping() {
        let single = config(false);
        let empty = VecDeque::new();
        assert_eq!(
            classify_exit(Some(0), &single, &empty).unwrap(),
            DownloadOutcome::Completed
        );
        assert_eq!(
            classify_exit(Some(EXIT_MAX_DOWNLOADS), &single, &empty).unwrap(),
            DownloadOutcome::MaxDownloadsReached
        );

        let err = classify_exit(Some(1), &single, &tail(&["ERROR: Video unavailable"])).unwrap_err();
        assert_eq!(err.kind(), "ExtractorFault");
        assert!(err.to_string().contains("Video unavailable"));
    }

    #[test]
    fn test_playlist_partial_failure_is_completed() {
        let playlist = config(true);
        let stderr = tail(&["ERROR: item 3 unavailable"]);
        assert_eq!(
            classify_exit(Some(1), &playlist, &stderr).unwrap(),
            DownloadOutcome::Completed
        );
        assert!(classify_exit(Some(2), &playlist, &stderr).is_err());
    }

    #[test]
    fn test_summarize_stderr_prefers_error_lines() {
        let lines = tail(&["ERROR: first", "WARNING: later warning"]);
        assert_eq!(summarize_stderr(&lines), "first");
        assert_eq!(summarize_stderr(&tail(&["plain"])), "plain");
        assert_eq!(summarize_stderr(&VecDeque::new()), "no error output");
    }

    #[tokio::test]
    async fn test_format_listing_without_binary_is_extractor_fault() {
        let extractor = YtDlpExtractor::new(YtDlpConfig {
            binary_path: "/nonexistent/yt-dlp-binary".to_string(),
            ..Default::default()
        });
        let err = extractor.probe("https://example.com/v").await.unwrap_err();
        assert!(matches!(err, Error::Extractor(_)));
    }
}
