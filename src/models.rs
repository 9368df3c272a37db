use serde::{Deserialize, Serialize};

/// Uninterpreted `yt-dlp -J` output. Every field may be missing or null.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMediaInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub upload_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub formats: Vec<RawFormat>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFormat {
    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub filesize: Option<f64>,
    #[serde(default)]
    pub filesize_approx: Option<f64>,
    #[serde(default)]
    pub abr: Option<f64>,
    #[serde(default)]
    pub tbr: Option<f64>,
    #[serde(default)]
    pub fps: Option<f64>,
    #[serde(default)]
    pub format_note: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<RawFormat>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<RawFormat>>::deserialize(deserializer)?.unwrap_or_default())
}

impl RawMediaInfo {
    pub fn find_format(&self, format_id: &str) -> Option<&RawFormat> {
        self.formats
            .iter()
            .find(|format| format.format_id.as_deref() == Some(format_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatKind {
    VideoAudioMerged,
    VideoNeedsMerge,
    Audio,
    AudioConverted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaType {
    Video,
    Audio,
    AudioConverted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatDescriptor {
    pub quality: String,
    pub resolution: String,
    pub format: String,
    pub size: String,
    pub format_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(rename = "type")]
    pub kind: FormatKind,
    pub media_type: MediaType,
    pub note: String,
    pub has_audio: bool,
}
