use std::path::PathBuf;

use crate::platform::Platform;

const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const ANDROID_USER_AGENT: &str =
    "com.google.android.youtube/19.09.37 (Linux; U; Android 11) gzip";
const IOS_USER_AGENT: &str =
    "com.google.ios.youtube/19.09.3 (iPhone14,3; U; CPU iOS 15_6 like Mac OS X)";

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub proxy_url: Option<String>,
    pub cookie_file: Option<PathBuf>,
}

impl Credentials {
    pub fn has_proxy(&self) -> bool {
        self.proxy_url.is_some()
    }

    /// The cookie file counts only while it is actually on disk.
    pub fn usable_cookie_file(&self) -> Option<&PathBuf> {
        self.cookie_file.as_ref().filter(|path| path.is_file())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyOptions {
    pub player_client: Option<String>,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub cookie_file: Option<PathBuf>,
    pub prefer_free_formats: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    pub name: &'static str,
    pub options: StrategyOptions,
}

impl Strategy {
    fn new(name: &'static str, options: StrategyOptions) -> Self {
        Self { name, options }
    }
}

fn mobile_client(client: &str, user_agent: &str) -> StrategyOptions {
    StrategyOptions {
        player_client: Some(client.to_string()),
        user_agent: Some(user_agent.to_string()),
        ..StrategyOptions::default()
    }
}

/// Ordered strategies for `platform`; never empty.
///
/// YouTube gets a ladder: proxy strategies when a proxy is configured,
/// then cookies when the file exists, then mobile client identities, then
/// engine defaults. Everything else gets a single standard attempt.
pub fn strategies_for(platform: Platform, credentials: &Credentials) -> Vec<Strategy> {
    if !platform.is_youtube() {
        return vec![Strategy::new(
            "Standard",
            StrategyOptions {
                user_agent: Some(DESKTOP_USER_AGENT.to_string()),
                prefer_free_formats: true,
                ..StrategyOptions::default()
            },
        )];
    }

    let mut strategies = Vec::new();

    if let Some(proxy) = credentials.proxy_url.as_deref() {
        strategies.push(Strategy::new(
            "Proxy + Android",
            StrategyOptions {
                proxy: Some(proxy.to_string()),
                ..mobile_client("android", ANDROID_USER_AGENT)
            },
        ));
        strategies.push(Strategy::new(
            "Proxy + iOS",
            StrategyOptions {
                proxy: Some(proxy.to_string()),
                ..mobile_client("ios", IOS_USER_AGENT)
            },
        ));
    }

    if let Some(cookie_file) = credentials.usable_cookie_file() {
        strategies.push(Strategy::new(
            "Android + Cookies",
            StrategyOptions {
                cookie_file: Some(cookie_file.clone()),
                ..mobile_client("android", ANDROID_USER_AGENT)
            },
        ));
    }

    strategies.push(Strategy::new(
        "Mobile Clients",
        mobile_client("ios,android", IOS_USER_AGENT),
    ));
    strategies.push(Strategy::new("Auto", StrategyOptions::default()));

    strategies
}

pub fn youtube_strategy_count(credentials: &Credentials) -> usize {
    strategies_for(Platform::YouTube, credentials).len()
}
