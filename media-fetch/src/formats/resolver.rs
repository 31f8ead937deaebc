//! Raw stream metadata → ranked, deduplicated format list.
//!
//! The six "best" selectors always lead the list in a fixed order. Concrete
//! streams follow, video before audio and then by descending rank. A code
//! appears at most once; the first occurrence wins.

use std::collections::HashSet;

use crate::domain::{FormatDescriptor, MediaType, RawStream};

/// Protocols whose streams can only be fetched through a manifest.
pub const MANIFEST_ONLY_PROTOCOLS: &[&str] = &["mhtml", "http_dash_segments", "f4m", "ism"];

/// Video-only streams below this height are not offered.
const MIN_MERGE_HEIGHT: f64 = 480.0;

/// The fixed selectors offered for every source.
pub fn fixed_formats() -> Vec<FormatDescriptor> {
    vec![
        FormatDescriptor::new(
            "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best",
            "Best Overall MP4 (Video+Audio, Recommended)",
            MediaType::Video,
            "mp4",
            10000,
        ),
        FormatDescriptor::new(
            "bestvideo+bestaudio/best",
            "Best Overall (Video+Audio, yt-dlp chooses container)",
            MediaType::Video,
            "video",
            9900,
        ),
        FormatDescriptor::new(
            "bestaudio[ext=m4a]/bestaudio",
            "Best Audio M4A (AAC)",
            MediaType::Audio,
            "m4a",
            5000,
        ),
        FormatDescriptor::new(
            "bestaudio_convert_mp3",
            "Convert Best Audio to MP3 (~192k)",
            MediaType::Audio,
            "mp3",
            4900,
        ),
        FormatDescriptor::new(
            "bestaudio_convert_wav",
            "Convert Best Audio to WAV",
            MediaType::Audio,
            "wav",
            4800,
        ),
        FormatDescriptor::new(
            "bestaudio_convert_aac",
            "Convert Best Audio to AAC (~192k)",
            MediaType::Audio,
            "aac",
            4700,
        ),
    ]
}

/// Build the format list for a probed source.
pub fn resolve_formats(streams: &[RawStream]) -> Vec<FormatDescriptor> {
    let reference_abr = reference_audio_abr(streams);

    let mut derived = Vec::new();
    let mut merged_resolutions: HashSet<(i64, String)> = HashSet::new();

    for stream in streams.iter().filter(|s| is_direct_stream(s)) {
        let Some(id) = stream.format_id.as_deref() else {
            continue;
        };
        let ext = stream.ext.as_deref().unwrap_or("?");
        let notes = describe_stream(stream, id);
        let size = stream.size_bytes();
        let size_label = size_label(size);

        match (stream.has_video(), stream.has_audio()) {
            (true, true) => {
                let mut desc = format!("{} ({}, Vid+Aud)", notes.join(" "), ext);
                push_bitrate(&mut desc, "V", stream.vbr);
                push_bitrate(&mut desc, "A", stream.abr);
                desc.push_str(&format!(" ~{}", size_label));

                let rank = stream.height.unwrap_or(0.0) * 100.0 + stream.abr.unwrap_or(0.0);
                derived.push(
                    FormatDescriptor::new(id, desc, MediaType::Video, ext, rank.round() as i64)
                        .with_size(size),
                );
            }
            (true, false) => {
                let Some(height) = stream.height.filter(|h| *h >= MIN_MERGE_HEIGHT) else {
                    continue;
                };
                if !merged_resolutions.insert((height as i64, ext.to_string())) {
                    continue;
                }

                let mut desc = format!("{} ({} + Best Audio)", notes.join(" "), ext);
                push_bitrate(&mut desc, "V", stream.vbr);
                if let Some(abr) = reference_abr.filter(|abr| *abr != 0.0) {
                    desc.push_str(&format!(" A:~{}k (est.)", abr.round() as i64));
                }
                desc.push_str(&format!(" ~{} (video stream size)", size_label));

                let rank = (height as i64) * 1000 + 500;
                derived.push(
                    FormatDescriptor::new(
                        format!("{}+bestaudio", id),
                        desc,
                        MediaType::Video,
                        ext,
                        rank,
                    )
                    .with_size(size),
                );
            }
            (false, true) => {
                let mut desc = format!("{} ({}, Audio Only)", notes.join(" "), ext);
                push_bitrate(&mut desc, "A", stream.abr);
                desc.push_str(&format!(" ~{}", size_label));

                let rank = stream.abr.unwrap_or(0.0).round() as i64;
                derived.push(
                    FormatDescriptor::new(id, desc, MediaType::Audio, ext, rank).with_size(size),
                );

                let base = &notes[0];
                if ext != "mp3" {
                    derived.push(FormatDescriptor::new(
                        format!("{}_convert_mp3", id),
                        format!("Convert '{} ({})' to MP3 (~192k)", base, ext),
                        MediaType::Audio,
                        "mp3",
                        rank,
                    ));
                }
                if ext != "wav" {
                    derived.push(FormatDescriptor::new(
                        format!("{}_convert_wav", id),
                        format!("Convert '{} ({})' to WAV", base, ext),
                        MediaType::Audio,
                        "wav",
                        rank,
                    ));
                }
            }
            (false, false) => {}
        }
    }

    derived.sort_by(|a, b| {
        media_order(a.media_type)
            .cmp(&media_order(b.media_type))
            .then_with(|| b.rank_key.cmp(&a.rank_key))
    });

    let mut seen = HashSet::new();
    fixed_formats()
        .into_iter()
        .chain(derived)
        .filter(|f| seen.insert(f.code.clone()))
        .collect()
}

fn media_order(media_type: MediaType) -> u8 {
    match media_type {
        MediaType::Video => 0,
        MediaType::Audio => 1,
    }
}

fn is_direct_stream(stream: &RawStream) -> bool {
    stream.manifest_url.is_none()
        && stream.url.as_deref().is_some_and(|u| !u.is_empty())
        && stream.format_id.as_deref().is_some_and(|id| !id.is_empty())
        && !stream
            .protocol
            .as_deref()
            .is_some_and(|p| MANIFEST_ONLY_PROTOCOLS.contains(&p))
}

/// Highest `abr` among direct audio-only streams.
fn reference_audio_abr(streams: &[RawStream]) -> Option<f64> {
    streams
        .iter()
        .filter(|s| {
            s.has_audio()
                && !s.has_video()
                && s.manifest_url.is_none()
                && s.url.as_deref().is_some_and(|u| !u.is_empty())
        })
        .map(|s| s.abr.unwrap_or(0.0))
        .fold(None, |best: Option<f64>, abr| match best {
            Some(current) if current >= abr => Some(current),
            _ => Some(abr),
        })
}

/// Leading note (format note, format name or id), resolution and frame rate.
fn describe_stream(stream: &RawStream, id: &str) -> Vec<String> {
    let mut notes = Vec::with_capacity(3);
    let lead = stream
        .format_note
        .as_deref()
        .filter(|s| !s.is_empty())
        .or(stream.format.as_deref().filter(|s| !s.is_empty()))
        .unwrap_or(id);
    notes.push(lead.to_string());

    if let (Some(w), Some(h)) = (stream.width, stream.height)
        && w > 0.0
        && h > 0.0
    {
        notes.push(format!("{}x{}", w as i64, h as i64));
    }
    if let Some(fps) = stream.fps.filter(|f| *f > 0.0) {
        notes.push(format!("{}fps", fps as i64));
    }
    notes
}

fn push_bitrate(desc: &mut String, label: &str, rate: Option<f64>) {
    if let Some(rate) = rate.filter(|r| *r != 0.0) {
        desc.push_str(&format!(" {}:{}k", label, rate.round() as i64));
    }
}

fn size_label(size: Option<u64>) -> String {
    match size {
        Some(bytes) => format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0)),
        None => "?".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(id: &str) -> RawStream {
        RawStream {
            format_id: Some(id.to_string()),
            url: Some(format!("https://cdn.example.com/{}", id)),
            ..Default::default()
        }
    }

    fn audio(id: &str, ext: &str, abr: f64) -> RawStream {
        RawStream {
            ext: Some(ext.to_string()),
            vcodec: Some("none".into()),
            acodec: Some("opus".into()),
            abr: Some(abr),
            ..stream(id)
        }
    }

    fn video_only(id: &str, ext: &str, height: f64) -> RawStream {
        RawStream {
            ext: Some(ext.to_string()),
            vcodec: Some("avc1".into()),
            acodec: Some("none".into()),
            height: Some(height),
            width: Some(height * 16.0 / 9.0),
            ..stream(id)
        }
    }

    fn codes(formats: &[FormatDescriptor]) -> Vec<&str> {
        formats.iter().map(|f| f.code.as_str()).collect()
    }

    #[test]
    fn test_no_streams_yields_fixed_formats() {
        let formats = resolve_formats(&[]);
        assert_eq!(formats, fixed_formats());
        assert_eq!(formats.len(), 6);
    }

    #[test]
    fn test_fixed_formats_lead_in_order() {
        let streams = vec![audio("251", "webm", 160.0), video_only("137", "mp4", 1080.0)];
        let formats = resolve_formats(&streams);
        let fixed = fixed_formats();
        assert_eq!(&formats[..6], &fixed[..]);
    }

    #[test]
    fn test_manifest_and_protocol_streams_excluded() {
        let mut manifest = audio("hls-1", "mp4", 128.0);
        manifest.manifest_url = Some("https://cdn.example.com/master.m3u8".into());
        let mut dash = audio("dash-1", "m4a", 128.0);
        dash.protocol = Some("http_dash_segments".into());
        let mut no_url = audio("nourl", "m4a", 128.0);
        no_url.url = None;
        let mut no_id = audio("x", "m4a", 128.0);
        no_id.format_id = None;

        let formats = resolve_formats(&[manifest, dash, no_url, no_id]);
        assert_eq!(formats.len(), 6);
    }

    #[test]
    fn test_video_only_merges_with_best_audio_once_per_resolution() {
        let streams = vec![
            audio("140", "m4a", 129.4),
            audio("251", "webm", 160.2),
            video_only("137", "mp4", 1080.0),
            video_only("137b", "mp4", 1080.0),
            video_only("248", "webm", 1080.0),
            video_only("160", "mp4", 144.0),
        ];
        let formats = resolve_formats(&streams);
        let codes = codes(&formats);

        assert!(codes.contains(&"137+bestaudio"));
        assert!(!codes.contains(&"137b+bestaudio"));
        assert!(codes.contains(&"248+bestaudio"));
        assert!(!codes.iter().any(|c| c.starts_with("160")));
        assert!(!codes.contains(&"137"));

        let merged = formats.iter().find(|f| f.code == "137+bestaudio").unwrap();
        assert_eq!(merged.rank_key, 1_080_500);
        assert!(merged.description.contains("(mp4 + Best Audio)"));
        assert!(merged.description.contains("A:~160k (est.)"));
        assert!(merged.description.ends_with("~? (video stream size)"));
    }

    #[test]
    fn test_audio_only_emits_conversion_derivatives() {
        let formats = resolve_formats(&[audio("251", "webm", 160.0), audio("mp3-1", "mp3", 128.0)]);
        let codes = codes(&formats);
        assert!(codes.contains(&"251"));
        assert!(codes.contains(&"251_convert_mp3"));
        assert!(codes.contains(&"251_convert_wav"));
        assert!(!codes.contains(&"mp3-1_convert_mp3"));
        assert!(codes.contains(&"mp3-1_convert_wav"));

        let convert = formats.iter().find(|f| f.code == "251_convert_mp3").unwrap();
        assert_eq!(convert.description, "Convert '251 (webm)' to MP3 (~192k)");
        assert_eq!(convert.extension, "mp3");
        assert_eq!(convert.rank_key, 160);
        assert!(convert.estimated_size_bytes.is_none());
    }

    #[test]
    fn test_combined_stream_description_and_rank() {
        let combined = RawStream {
            ext: Some("mp4".into()),
            vcodec: Some("avc1".into()),
            acodec: Some("mp4a".into()),
            format_note: Some("360p".into()),
            width: Some(640.0),
            height: Some(360.0),
            fps: Some(30.0),
            vbr: Some(500.4),
            abr: Some(96.0),
            filesize: Some(10.0 * 1024.0 * 1024.0),
            ..stream("18")
        };
        let formats = resolve_formats(&[combined]);
        let entry = formats.iter().find(|f| f.code == "18").unwrap();
        assert_eq!(entry.media_type, MediaType::Video);
        assert_eq!(entry.rank_key, 36_096);
        assert_eq!(
            entry.description,
            "360p 640x360 30fps (mp4, Vid+Aud) V:500k A:96k ~10.0MB"
        );
        assert_eq!(entry.estimated_size_bytes, Some(10 * 1024 * 1024));
    }

    #[test]
    fn test_stream_entries_sorted_video_first_then_rank() {
        let streams = vec![
            audio("140", "m4a", 129.0),
            video_only("136", "mp4", 720.0),
            audio("251", "webm", 160.0),
            video_only("137", "mp4", 1080.0),
        ];
        let formats = resolve_formats(&streams);
        let tail = &formats[6..];
        let first_audio = tail
            .iter()
            .position(|f| f.media_type == MediaType::Audio)
            .unwrap();
        assert!(tail[..first_audio].iter().all(|f| f.media_type == MediaType::Video));
        assert!(tail[first_audio..].iter().all(|f| f.media_type == MediaType::Audio));
        assert_eq!(tail[0].code, "137+bestaudio");
        assert_eq!(tail[1].code, "136+bestaudio");
        assert!(tail[first_audio..]
            .windows(2)
            .all(|w| w[0].rank_key >= w[1].rank_key));
    }

    #[test]
    fn test_duplicate_codes_first_wins() {
        let mut fake_seed = audio("bestaudio_convert_mp3", "mp3", 999.0);
        fake_seed.ext = Some("mp3".into());
        let formats = resolve_formats(&[fake_seed, audio("251", "webm", 1.0), audio("251", "webm", 2.0)]);
        let seed = formats
            .iter()
            .find(|f| f.code == "bestaudio_convert_mp3")
            .unwrap();
        assert_eq!(seed.rank_key, 4900);
        assert_eq!(codes(&formats).iter().filter(|c| **c == "251").count(), 1);
    }
}
