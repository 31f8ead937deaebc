//! `JobConfiguration` → yt-dlp command-line arguments.

use std::path::Path;

use super::progress::progress_template;
use crate::domain::{JobConfiguration, PostProcessor};

/// Metadata fields copied into the output container: `(source template, target field)`.
const METADATA_MAPPINGS: &[(&str, &str)] = &[
    ("%(uploader)s", "meta_artist"),
    ("%(uploader)s", "meta_album_artist"),
    ("%(upload_date)s", "meta_date"),
    ("%(description)s", "meta_comment"),
];

/// Arguments for a metadata-only probe of `url`.
pub fn build_probe_args(url: &str) -> Vec<String> {
    vec![
        "--dump-single-json".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--no-check-certificates".to_string(),
        "--skip-download".to_string(),
        "--".to_string(),
        url.to_string(),
    ]
}

/// Arguments for downloading `config` into `output_dir`.
pub fn build_download_args(
    config: &JobConfiguration,
    output_dir: &Path,
    ffmpeg_location: Option<&str>,
) -> Vec<String> {
    let mut args = vec![
        "--newline".to_string(),
        "--no-check-certificates".to_string(),
        "--progress-template".to_string(),
        progress_template(),
        "-f".to_string(),
        config.selector.clone(),
        "-o".to_string(),
        output_dir
            .join(&config.output_template)
            .to_string_lossy()
            .into_owned(),
    ];

    if config.is_playlist {
        args.push("--yes-playlist".to_string());
    } else {
        args.push("--no-playlist".to_string());
    }

    if config.ignore_errors {
        args.push("--ignore-errors".to_string());
    } else {
        args.push("--abort-on-error".to_string());
    }

    if let Some(max) = config.max_downloads {
        args.extend(["--max-downloads".to_string(), max.to_string()]);
    }

    let mut thumbnail_flag = false;
    for pp in &config.post_processors {
        match pp {
            PostProcessor::ExtractAudio { codec, quality } => {
                args.extend([
                    "-x".to_string(),
                    "--audio-format".to_string(),
                    codec.clone(),
                ]);
                if let Some(quality) = quality {
                    args.extend(["--audio-quality".to_string(), quality.clone()]);
                }
            }
            PostProcessor::ConvertVideo { container } => {
                args.extend(["--recode-video".to_string(), container.clone()]);
            }
            PostProcessor::EmbedThumbnail => thumbnail_flag = true,
        }
    }

    if config.embed_thumbnail || thumbnail_flag {
        args.push("--embed-thumbnail".to_string());
    }

    if config.embed_metadata {
        args.push("--embed-metadata".to_string());
        for (from, to) in METADATA_MAPPINGS {
            args.extend([
                "--parse-metadata".to_string(),
                format!("{}:%({})s", from, to),
            ]);
        }
    }

    if let Some(location) = ffmpeg_location {
        args.extend(["--ffmpeg-location".to_string(), location.to_string()]);
    }

    args.push("--".to_string());
    args.push(config.source_url.clone());
    args
}
