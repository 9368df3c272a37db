use std::collections::HashMap;

use crate::models::{FormatDescriptor, FormatKind, MediaType};

/// Upper bound on real formats returned; the MP3 option comes on top.
pub const MAX_FORMATS: usize = 8;
pub const MP3_FORMAT_ID: &str = "mp3-best";

/// Leading integer of a quality label: "1080p60" -> 1080, "Audio" -> 0.
fn quality_rank(quality: &str) -> u32 {
    let digits = quality
        .trim()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>();
    digits.parse().unwrap_or(0)
}

fn mp3_option() -> FormatDescriptor {
    FormatDescriptor {
        quality: "MP3 Audio".to_string(),
        resolution: "Unknown".to_string(),
        format: "mp3".to_string(),
        size: "Varies".to_string(),
        format_id: MP3_FORMAT_ID.to_string(),
        fps: None,
        kind: FormatKind::AudioConverted,
        media_type: MediaType::AudioConverted,
        note: "Best audio converted to MP3".to_string(),
        has_audio: true,
    }
}

pub fn rank(descriptors: Vec<FormatDescriptor>) -> Vec<FormatDescriptor> {
    let (mut videos, mut audios): (Vec<_>, Vec<_>) = descriptors
        .into_iter()
        .filter(|descriptor| descriptor.media_type != MediaType::AudioConverted)
        .partition(|descriptor| descriptor.media_type == MediaType::Video);

    videos.sort_by_key(|descriptor| std::cmp::Reverse(quality_rank(&descriptor.quality)));
    audios.sort_by_key(|descriptor| std::cmp::Reverse(quality_rank(&descriptor.quality)));

    let mut ranked: Vec<FormatDescriptor> = Vec::new();
    let mut positions: HashMap<(String, MediaType), usize> = HashMap::new();

    // Same label and media type collapse even when resolutions differ.
    for descriptor in videos.into_iter().chain(audios) {
        let key = (descriptor.quality.clone(), descriptor.media_type);
        match positions.get(&key) {
            Some(&index) => {
                if descriptor.has_audio && !ranked[index].has_audio {
                    ranked[index] = descriptor;
                }
            }
            None => {
                positions.insert(key, ranked.len());
                ranked.push(descriptor);
            }
        }
    }

    ranked.truncate(MAX_FORMATS);
    ranked.push(mp3_option());
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(quality: &str, media_type: MediaType, format_id: &str, has_audio: bool) -> FormatDescriptor {
        FormatDescriptor {
            quality: quality.to_string(),
            resolution: "Unknown".to_string(),
            format: "mp4".to_string(),
            size: "Unknown".to_string(),
            format_id: format_id.to_string(),
            fps: None,
            kind: if media_type == MediaType::Audio {
                FormatKind::Audio
            } else if has_audio {
                FormatKind::VideoAudioMerged
            } else {
                FormatKind::VideoNeedsMerge
            },
            media_type,
            note: String::new(),
            has_audio,
        }
    }

    fn ids(ranked: &[FormatDescriptor]) -> Vec<&str> {
        ranked.iter().map(|d| d.format_id.as_str()).collect()
    }

    #[test]
    fn parses_leading_integer() {
        assert_eq!(quality_rank("1080p"), 1080);
        assert_eq!(quality_rank("720p60"), 720);
        assert_eq!(quality_rank("128kbps"), 128);
        assert_eq!(quality_rank("Audio"), 0);
        assert_eq!(quality_rank(""), 0);
    }

    #[test]
    fn sorts_videos_descending_then_audio() {
        let ranked = rank(vec![
            descriptor("128kbps", MediaType::Audio, "a128", true),
            descriptor("360p", MediaType::Video, "v360", true),
            descriptor("Video", MediaType::Video, "vnone", true),
            descriptor("1080p", MediaType::Video, "v1080", true),
            descriptor("256kbps", MediaType::Audio, "a256", true),
        ]);

        assert_eq!(
            ids(&ranked),
            vec!["v1080", "v360", "vnone", "a256", "a128", MP3_FORMAT_ID]
        );
    }

    #[test]
    fn duplicate_with_audio_replaces_silent_entry() {
        let ranked = rank(vec![
            descriptor("720p", MediaType::Video, "silent", false),
            descriptor("720p", MediaType::Video, "with-audio", true),
            descriptor("720p", MediaType::Video, "later", true),
        ]);

        assert_eq!(ids(&ranked), vec!["with-audio", MP3_FORMAT_ID]);
    }

    #[test]
    fn first_seen_wins_when_audio_is_equal() {
        let ranked = rank(vec![
            descriptor("720p", MediaType::Video, "first", true),
            descriptor("720p", MediaType::Video, "second", true),
        ]);

        assert_eq!(ids(&ranked), vec!["first", MP3_FORMAT_ID]);
    }

    #[test]
    fn same_label_different_resolution_collapses() {
        let mut wide = descriptor("720p", MediaType::Video, "wide", true);
        wide.resolution = "1280x720".to_string();
        let mut square = descriptor("720p", MediaType::Video, "square", true);
        square.resolution = "720x720".to_string();

        let ranked = rank(vec![wide, square]);
        assert_eq!(ids(&ranked), vec!["wide", MP3_FORMAT_ID]);
    }

    #[test]
    fn same_label_different_media_type_is_kept() {
        let ranked = rank(vec![
            descriptor("Audio", MediaType::Audio, "a", true),
            descriptor("Audio", MediaType::Video, "v", true),
        ]);

        assert_eq!(ids(&ranked), vec!["v", "a", MP3_FORMAT_ID]);
    }

    #[test]
    fn truncates_but_always_appends_mp3() {
        let input = (1..=12)
            .map(|n| descriptor(&format!("{}p", n * 100), MediaType::Video, &format!("v{n}"), true))
            .collect::<Vec<_>>();

        let ranked = rank(input);
        assert_eq!(ranked.len(), MAX_FORMATS + 1);
        assert_eq!(ranked[0].format_id, "v12");
        assert_eq!(ranked[MAX_FORMATS - 1].format_id, "v5");
        assert_eq!(ranked[MAX_FORMATS].format_id, MP3_FORMAT_ID);
    }

    #[test]
    fn empty_input_yields_only_mp3() {
        let ranked = rank(Vec::new());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].quality, "MP3 Audio");
        assert_eq!(ranked[0].kind, FormatKind::AudioConverted);
        assert_eq!(ranked[0].size, "Varies");
    }

    #[test]
    fn mp3_is_never_duplicated() {
        let ranked = rank(vec![mp3_option(), descriptor("480p", MediaType::Video, "v", true)]);
        let mp3_count = ranked
            .iter()
            .filter(|d| d.format_id == MP3_FORMAT_ID)
            .count();
        assert_eq!(mp3_count, 1);
        assert_eq!(ranked.last().map(|d| d.format_id.as_str()), Some(MP3_FORMAT_ID));
    }

    #[test]
    fn equal_quality_order_is_stable() {
        let forward = rank(vec![
            descriptor("720p", MediaType::Video, "x", true),
            descriptor("1080p", MediaType::Video, "y", true),
            descriptor("480p", MediaType::Video, "z", true),
        ]);
        let shuffled = rank(vec![
            descriptor("480p", MediaType::Video, "z", true),
            descriptor("720p", MediaType::Video, "x", true),
            descriptor("1080p", MediaType::Video, "y", true),
        ]);

        assert_eq!(ids(&forward), ids(&shuffled));
    }
}
