use std::fmt;

use serde::Serialize;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Platform {
    #[serde(rename = "YouTube")]
    YouTube,
    #[serde(rename = "Instagram")]
    Instagram,
    #[serde(rename = "Facebook")]
    Facebook,
    #[serde(rename = "TikTok")]
    TikTok,
    #[serde(rename = "Twitter/X")]
    Twitter,
    #[serde(rename = "Snapchat")]
    Snapchat,
    #[serde(rename = "LinkedIn")]
    LinkedIn,
    #[serde(rename = "Unknown")]
    Unknown,
}

/// Host needles in match order. `exact` needles must equal the host or be a
/// dot-separated suffix of it instead of a plain substring.
const HOST_RULES: [(&str, Platform, bool); 10] = [
    ("youtube.com", Platform::YouTube, false),
    ("youtu.be", Platform::YouTube, false),
    ("instagram.com", Platform::Instagram, false),
    ("facebook.com", Platform::Facebook, false),
    ("fb.watch", Platform::Facebook, false),
    ("tiktok.com", Platform::TikTok, false),
    ("twitter.com", Platform::Twitter, false),
    ("x.com", Platform::Twitter, true),
    ("snapchat.com", Platform::Snapchat, false),
    ("linkedin.com", Platform::LinkedIn, false),
];

impl Platform {
    /// Maps a URL to its platform. Never fails: anything unrecognised,
    /// including input that is not a URL at all, is `Unknown`.
    pub fn classify(input: &str) -> Self {
        let host = Url::parse(input.trim())
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
            .unwrap_or_else(|| input.trim().to_ascii_lowercase());

        HOST_RULES
            .iter()
            .find(|(needle, _, exact)| {
                if *exact {
                    host == *needle || host.ends_with(&format!(".{needle}"))
                } else {
                    host.contains(needle)
                }
            })
            .map(|(_, platform, _)| *platform)
            .unwrap_or(Platform::Unknown)
    }

    pub fn is_youtube(self) -> bool {
        self == Platform::YouTube
    }

    pub fn label(self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube",
            Platform::Instagram => "Instagram",
            Platform::Facebook => "Facebook",
            Platform::TikTok => "TikTok",
            Platform::Twitter => "Twitter/X",
            Platform::Snapchat => "Snapchat",
            Platform::LinkedIn => "LinkedIn",
            Platform::Unknown => "Unknown",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
            Platform::TikTok => "tiktok",
            Platform::Twitter => "twitter",
            Platform::Snapchat => "snapchat",
            Platform::LinkedIn => "linkedin",
            Platform::Unknown => "media",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
