use std::cmp::Ordering;

use crate::{
    models::{FormatDescriptor, FormatKind, MediaType, RawFormat, RawMediaInfo},
    platform::Platform,
};

const ACCEPTED_VIDEO_CONTAINERS: [&str; 4] = ["mp4", "webm", "mov", "m4v"];
const AUDIO_CONTAINERS: [&str; 6] = ["m4a", "mp3", "aac", "ogg", "opus", "wav"];
/// Video-only YouTube streams below this height are not offered.
const MIN_MERGE_HEIGHT: u32 = 360;
/// YouTube's itag for 128 kbps AAC, used when no audio-only stream was listed.
const DEFAULT_YOUTUBE_AUDIO_ID: &str = "140";

fn real_codec(codec: Option<&str>) -> bool {
    codec.is_some_and(|value| !value.trim().is_empty() && value != "none")
}

fn has_real_video_codec(format: &RawFormat) -> bool {
    real_codec(format.vcodec.as_deref())
}

fn has_real_audio_codec(format: &RawFormat) -> bool {
    real_codec(format.acodec.as_deref())
}

fn ext_of(format: &RawFormat) -> Option<String> {
    format.ext.as_deref().map(str::to_ascii_lowercase)
}

fn is_accepted_container(format: &RawFormat) -> bool {
    ext_of(format).is_some_and(|ext| ACCEPTED_VIDEO_CONTAINERS.contains(&ext.as_str()))
}

fn is_audio_container(format: &RawFormat) -> bool {
    ext_of(format).is_some_and(|ext| AUDIO_CONTAINERS.contains(&ext.as_str()))
}

fn declared_audio_only(format: &RawFormat) -> bool {
    format.vcodec.as_deref() == Some("none") && has_real_audio_codec(format)
}

fn is_audio_only(format: &RawFormat) -> bool {
    !has_real_video_codec(format) && has_real_audio_codec(format)
}

/// Generic video heuristic. Any one rule is enough, checked in this order.
fn looks_like_video(format: &RawFormat) -> bool {
    if has_real_video_codec(format) {
        return true;
    }
    let has_dimensions =
        format.width.is_some_and(|width| width > 0) && format.height.is_some_and(|height| height > 0);
    if has_dimensions && is_accepted_container(format) {
        return true;
    }
    if is_accepted_container(format) && format.url.is_some() && !declared_audio_only(format) {
        return true;
    }
    format
        .format_id
        .as_deref()
        .is_some_and(|id| id.contains("video"))
}

/// Best-effort: a video in an accepted container with no audio codec listed
/// is assumed to carry audio.
pub(crate) fn carries_audio(format: &RawFormat) -> bool {
    has_real_audio_codec(format) || (is_accepted_container(format) && format.acodec.is_none())
}

pub(crate) fn is_audio_entry(format: &RawFormat) -> bool {
    !looks_like_video(format) && (has_real_audio_codec(format) || is_audio_container(format))
}

fn bitrate(format: &RawFormat) -> f64 {
    format.abr.or(format.tbr).unwrap_or_default()
}

fn best_audio(formats: &[RawFormat]) -> Option<&RawFormat> {
    formats
        .iter()
        .filter(|format| format.format_id.is_some() && is_audio_only(format))
        .max_by(|a, b| bitrate(a).partial_cmp(&bitrate(b)).unwrap_or(Ordering::Equal))
}

fn byte_size(format: &RawFormat) -> Option<(f64, bool)> {
    format
        .filesize
        .map(|bytes| (bytes, false))
        .or_else(|| format.filesize_approx.map(|bytes| (bytes, true)))
}

pub fn format_size(size: Option<(f64, bool)>) -> String {
    match size {
        Some((bytes, approximate)) => {
            let mb = bytes / 1_048_576.0;
            if approximate {
                format!("~{mb:.2} MB")
            } else {
                format!("{mb:.2} MB")
            }
        }
        None => "Unknown".to_string(),
    }
}

fn merged_size(video: &RawFormat, audio: Option<&RawFormat>) -> Option<(f64, bool)> {
    let (video_bytes, video_approx) = byte_size(video)?;
    match audio.and_then(byte_size) {
        Some((audio_bytes, audio_approx)) => {
            Some((video_bytes + audio_bytes, video_approx || audio_approx))
        }
        None => Some((video_bytes, true)),
    }
}

fn resolution(format: &RawFormat) -> String {
    match (format.width, format.height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => format!("{width}x{height}"),
        (_, Some(height)) if height > 0 => format!("{height}p"),
        _ => "Unknown".to_string(),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn audio_quality(format: &RawFormat) -> String {
    format
        .abr
        .filter(|abr| *abr > 0.0)
        .map(|abr| format!("{}kbps", abr.round() as u32))
        .unwrap_or_else(|| "Audio".to_string())
}

fn audio_descriptor(format: &RawFormat, format_id: &str) -> FormatDescriptor {
    FormatDescriptor {
        quality: audio_quality(format),
        resolution: "Unknown".to_string(),
        format: ext_of(format).unwrap_or_else(|| "m4a".to_string()),
        size: format_size(byte_size(format)),
        format_id: format_id.to_string(),
        fps: None,
        kind: FormatKind::Audio,
        media_type: MediaType::Audio,
        note: format
            .acodec
            .as_deref()
            .filter(|codec| real_codec(Some(*codec)))
            .map(|codec| format!("Audio only ({codec})"))
            .unwrap_or_else(|| "Audio only".to_string()),
        has_audio: true,
    }
}

pub fn normalize(platform: Platform, info: &RawMediaInfo) -> Vec<FormatDescriptor> {
    if platform.is_youtube() {
        normalize_youtube(&info.formats)
    } else {
        normalize_generic(&info.formats)
    }
}

fn normalize_youtube(formats: &[RawFormat]) -> Vec<FormatDescriptor> {
    let best = best_audio(formats);
    let best_audio_id = best
        .and_then(|format| format.format_id.as_deref())
        .unwrap_or(DEFAULT_YOUTUBE_AUDIO_ID);

    let mut descriptors = Vec::new();

    for format in formats {
        let Some(id) = format.format_id.as_deref() else {
            continue;
        };

        let video_quality = || {
            non_empty(format.format_note.as_deref())
                .or_else(|| format.height.map(|height| format!("{height}p")))
                .unwrap_or_else(|| "Video".to_string())
        };

        if has_real_video_codec(format) && has_real_audio_codec(format) && is_accepted_container(format)
        {
            descriptors.push(FormatDescriptor {
                quality: video_quality(),
                resolution: resolution(format),
                format: ext_of(format).unwrap_or_else(|| "mp4".to_string()),
                size: format_size(byte_size(format)),
                format_id: id.to_string(),
                fps: format.fps,
                kind: FormatKind::VideoAudioMerged,
                media_type: MediaType::Video,
                note: "Video + Audio".to_string(),
                has_audio: true,
            });
        } else if has_real_video_codec(format)
            && !has_real_audio_codec(format)
            && format.height.is_some_and(|height| height >= MIN_MERGE_HEIGHT)
            && is_accepted_container(format)
        {
            descriptors.push(FormatDescriptor {
                quality: video_quality(),
                resolution: resolution(format),
                format: "mp4".to_string(),
                size: format_size(merged_size(format, best)),
                format_id: format!("{id}+{best_audio_id}"),
                fps: format.fps,
                kind: FormatKind::VideoNeedsMerge,
                media_type: MediaType::Video,
                note: "Merged with best audio".to_string(),
                has_audio: true,
            });
        } else if is_audio_only(format) {
            descriptors.push(audio_descriptor(format, id));
        }
    }

    descriptors
}

fn normalize_generic(formats: &[RawFormat]) -> Vec<FormatDescriptor> {
    let best = best_audio(formats);
    let best_audio_id = best.and_then(|format| format.format_id.as_deref());

    let mut descriptors = Vec::new();

    for format in formats {
        let Some(id) = format.format_id.as_deref() else {
            continue;
        };

        if looks_like_video(format) {
            let quality = format
                .height
                .filter(|height| *height > 0)
                .map(|height| format!("{height}p"))
                .or_else(|| non_empty(format.format_note.as_deref()))
                .unwrap_or_else(|| "Video".to_string());
            let container = ext_of(format).unwrap_or_else(|| "mp4".to_string());

            let descriptor = if carries_audio(format) {
                FormatDescriptor {
                    quality,
                    resolution: resolution(format),
                    format: container,
                    size: format_size(byte_size(format)),
                    format_id: id.to_string(),
                    fps: format.fps,
                    kind: FormatKind::VideoAudioMerged,
                    media_type: MediaType::Video,
                    note: "Video + Audio".to_string(),
                    has_audio: true,
                }
            } else if let Some(audio_id) = best_audio_id {
                FormatDescriptor {
                    quality,
                    resolution: resolution(format),
                    format: "mp4".to_string(),
                    size: format_size(merged_size(format, best)),
                    format_id: format!("{id}+{audio_id}"),
                    fps: format.fps,
                    kind: FormatKind::VideoNeedsMerge,
                    media_type: MediaType::Video,
                    note: "Merged with best audio".to_string(),
                    has_audio: true,
                }
            } else {
                FormatDescriptor {
                    quality,
                    resolution: resolution(format),
                    format: container,
                    size: format_size(byte_size(format)),
                    format_id: id.to_string(),
                    fps: format.fps,
                    kind: FormatKind::VideoNeedsMerge,
                    media_type: MediaType::Video,
                    note: "Video only".to_string(),
                    has_audio: false,
                }
            };

            descriptors.push(descriptor);
        } else if is_audio_entry(format) {
            descriptors.push(audio_descriptor(format, id));
        }
    }

    descriptors
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn raw(id: &str) -> RawFormat {
        RawFormat {
            format_id: Some(id.to_string()),
            ..RawFormat::default()
        }
    }

    pub(crate) fn video(id: &str, ext: &str, height: u32, acodec: Option<&str>) -> RawFormat {
        RawFormat {
            ext: Some(ext.to_string()),
            vcodec: Some("avc1.640028".to_string()),
            acodec: acodec.map(ToString::to_string),
            width: Some(height * 16 / 9),
            height: Some(height),
            ..raw(id)
        }
    }

    pub(crate) fn audio(id: &str, abr: f64) -> RawFormat {
        RawFormat {
            ext: Some("m4a".to_string()),
            vcodec: Some("none".to_string()),
            acodec: Some("mp4a.40.2".to_string()),
            abr: Some(abr),
            ..raw(id)
        }
    }

    pub(crate) fn media(formats: Vec<RawFormat>) -> RawMediaInfo {
        RawMediaInfo {
            id: Some("abc".to_string()),
            title: Some("Sample".to_string()),
            formats,
            ..RawMediaInfo::default()
        }
    }

    #[test]
    fn size_rendering() {
        assert_eq!(format_size(Some((10_485_760.0, false))), "10.00 MB");
        assert_eq!(format_size(Some((1_572_864.0, true))), "~1.50 MB");
        assert_eq!(format_size(None), "Unknown");
    }

    #[test]
    fn youtube_buckets_and_merge_ids() {
        let info = media(vec![
            video("18", "mp4", 360, Some("mp4a.40.2")),
            video("137", "mp4", 1080, Some("none")),
            video("160", "mp4", 144, Some("none")),
            audio("139", 48.0),
            audio("140", 129.5),
            RawFormat {
                ext: Some("mhtml".to_string()),
                vcodec: Some("none".to_string()),
                acodec: Some("none".to_string()),
                ..raw("sb0")
            },
        ]);

        let descriptors = normalize(Platform::YouTube, &info);
        let ids = descriptors
            .iter()
            .map(|descriptor| descriptor.format_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["18", "137+140", "139", "140"]);

        assert_eq!(descriptors[0].kind, FormatKind::VideoAudioMerged);
        assert_eq!(descriptors[0].quality, "360p");
        assert_eq!(descriptors[1].kind, FormatKind::VideoNeedsMerge);
        assert_eq!(descriptors[1].resolution, "1920x1080");
        assert_eq!(descriptors[3].quality, "130kbps");
        assert_eq!(descriptors[3].media_type, MediaType::Audio);
    }

    #[test]
    fn youtube_prefers_format_note_for_quality() {
        let info = media(vec![RawFormat {
            format_note: Some("1080p60".to_string()),
            ..video("299", "mp4", 1080, Some("none"))
        }]);

        let descriptors = normalize(Platform::YouTube, &info);
        assert_eq!(descriptors[0].quality, "1080p60");
    }

    #[test]
    fn youtube_falls_back_to_default_audio_id() {
        let info = media(vec![video("137", "mp4", 1080, Some("none"))]);

        let descriptors = normalize(Platform::YouTube, &info);
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].format_id, "137+140");
    }

    #[test]
    fn youtube_rejects_unaccepted_containers() {
        let info = media(vec![video("1", "3gp", 720, Some("mp4a.40.2"))]);
        assert!(normalize(Platform::YouTube, &info).is_empty());
    }

    #[test]
    fn generic_video_with_audio_and_audio_only() {
        let info = media(vec![
            video("hd", "mp4", 720, Some("mp4a.40.2")),
            audio("dash-audio", 128.0),
        ]);

        let descriptors = normalize(Platform::TikTok, &info);
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].kind, FormatKind::VideoAudioMerged);
        assert_eq!(descriptors[0].format_id, "hd");
        assert_eq!(descriptors[1].kind, FormatKind::Audio);
        assert_eq!(descriptors[1].format_id, "dash-audio");
    }

    #[test]
    fn generic_video_only_merges_with_best_audio() {
        let info = media(vec![
            video("dash-720", "mp4", 720, Some("none")),
            audio("low", 64.0),
            audio("high", 160.0),
        ]);

        let descriptors = normalize(Platform::Instagram, &info);
        assert_eq!(descriptors[0].format_id, "dash-720+high");
        assert_eq!(descriptors[0].kind, FormatKind::VideoNeedsMerge);
        assert!(descriptors[0].has_audio);
    }

    #[test]
    fn generic_video_without_any_audio_is_degraded() {
        let info = media(vec![video("v1", "mp4", 480, Some("none"))]);

        let descriptors = normalize(Platform::Facebook, &info);
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].format_id, "v1");
        assert!(!descriptors[0].has_audio);
        assert_eq!(descriptors[0].note, "Video only");
    }

    #[test]
    fn generic_infers_audio_from_container_when_codecs_missing() {
        let info = media(vec![RawFormat {
            ext: Some("mp4".to_string()),
            url: Some("https://cdn.example.com/v.mp4".to_string()),
            ..raw("0")
        }]);

        let descriptors = normalize(Platform::Twitter, &info);
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].kind, FormatKind::VideoAudioMerged);
        assert!(descriptors[0].has_audio);
        assert_eq!(descriptors[0].quality, "Video");
        assert_eq!(descriptors[0].resolution, "Unknown");
    }

    #[test]
    fn generic_video_id_substring_counts_as_video() {
        let info = media(vec![RawFormat {
            ext: Some("flv".to_string()),
            ..raw("hls-video-1")
        }]);

        let descriptors = normalize(Platform::LinkedIn, &info);
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].media_type, MediaType::Video);
        assert!(!descriptors[0].has_audio);
    }

    #[test]
    fn declared_audio_in_mp4_stays_audio() {
        let info = media(vec![RawFormat {
            ext: Some("mp4".to_string()),
            url: Some("https://cdn.example.com/a.mp4".to_string()),
            vcodec: Some("none".to_string()),
            acodec: Some("mp4a.40.5".to_string()),
            ..raw("audio-aac")
        }]);

        let descriptors = normalize(Platform::Snapchat, &info);
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].kind, FormatKind::Audio);
        assert_eq!(descriptors[0].format, "mp4");
    }

    #[test]
    fn entries_without_ids_are_skipped() {
        let mut nameless = video("x", "mp4", 720, Some("mp4a.40.2"));
        nameless.format_id = None;

        assert!(normalize(Platform::Unknown, &media(vec![nameless.clone()])).is_empty());
        assert!(normalize(Platform::YouTube, &media(vec![nameless])).is_empty());
    }

    #[test]
    fn merged_size_sums_video_and_audio() {
        let video = RawFormat {
            filesize: Some(1_048_576.0),
            ..video("137", "mp4", 1080, Some("none"))
        };
        let audio = RawFormat {
            filesize_approx: Some(1_048_576.0),
            ..audio("140", 128.0)
        };

        let descriptors = normalize(Platform::YouTube, &media(vec![video, audio]));
        assert_eq!(descriptors[0].size, "~2.00 MB");
        assert_eq!(descriptors[1].size, "~1.00 MB");
    }
}
