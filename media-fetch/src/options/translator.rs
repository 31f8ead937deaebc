//! Format code → job configuration.

use crate::domain::{JobConfiguration, MediaType, PostProcessor};

use super::template::resolve_output_template;

/// Separator between a source selector and a conversion codec, e.g. `bestaudio_convert_mp3`.
pub const CONVERT_MARKER: &str = "_convert_";

const LOSSY_AUDIO_QUALITY: &str = "192K";

/// Audio extensions recognised inside a plain audio selector, in priority order.
const AUDIO_SELECTOR_TOKENS: &[&str] = &["mp3", "m4a", "aac", "wav", "flac", "opus"];

/// Parameters of a download request, before translation.
#[derive(Debug, Clone, Copy)]
pub struct JobRequest<'a> {
    pub url: &'a str,
    pub format_code: &'a str,
    pub media_type: MediaType,
    pub is_playlist: bool,
    pub filename_template: Option<&'a str>,
}

struct ConversionTarget {
    quality: Option<&'static str>,
    embeds_thumbnail: bool,
}

fn conversion_target(codec: &str) -> Option<ConversionTarget> {
    let target = match codec {
        "mp3" | "aac" | "opus" => ConversionTarget {
            quality: Some(LOSSY_AUDIO_QUALITY),
            embeds_thumbnail: true,
        },
        "flac" => ConversionTarget {
            quality: None,
            embeds_thumbnail: true,
        },
        "wav" => ConversionTarget {
            quality: None,
            embeds_thumbnail: false,
        },
        _ => return None,
    };
    Some(target)
}

/// Build the immutable configuration for one job.
///
/// Never fails: unknown conversion codecs degrade to a plain download of the
/// source selector with no expected extension.
pub fn build_job_configuration(request: JobRequest<'_>) -> JobConfiguration {
    let mut post_processors = Vec::new();
    let selector: String;
    let expected_final_extension: Option<String>;
    let embed_thumbnail: bool;

    if let Some((source, codec)) = request.format_code.split_once(CONVERT_MARKER) {
        let codec = codec.to_ascii_lowercase();
        selector = source.to_string();
        match conversion_target(&codec) {
            Some(target) => {
                post_processors.push(PostProcessor::ExtractAudio {
                    codec: codec.clone(),
                    quality: target.quality.map(str::to_string),
                });
                expected_final_extension = Some(codec);
                embed_thumbnail = target.embeds_thumbnail;
            }
            None => {
                tracing::warn!(
                    format_code = %request.format_code,
                    codec = %codec,
                    "Unsupported conversion target, downloading source format as-is"
                );
                expected_final_extension = None;
                embed_thumbnail = false;
            }
        }
    } else {
        selector = request.format_code.to_string();
        match request.media_type {
            MediaType::Video => {
                post_processors.push(PostProcessor::ConvertVideo {
                    container: "mp4".to_string(),
                });
                expected_final_extension = Some("mp4".to_string());
                embed_thumbnail = true;
            }
            MediaType::Audio => {
                let lowered = request.format_code.to_ascii_lowercase();
                let token = AUDIO_SELECTOR_TOKENS
                    .iter()
                    .find(|token| lowered.contains(*token));
                expected_final_extension = token.map(|t| t.to_string());
                embed_thumbnail = matches!(token, Some(t) if *t != "wav");
            }
        }
    }

    if embed_thumbnail && !post_processors.iter().any(PostProcessor::embeds_thumbnail) {
        post_processors.push(PostProcessor::EmbedThumbnail);
    }

    JobConfiguration {
        source_url: request.url.to_string(),
        selector,
        media_type: request.media_type,
        is_playlist: request.is_playlist,
        output_template: resolve_output_template(request.filename_template, request.is_playlist),
        post_processors,
        embed_thumbnail,
        embed_metadata: true,
        expected_final_extension,
        max_downloads: if request.is_playlist { None } else { Some(1) },
        ignore_errors: request.is_playlist,
    }
}
