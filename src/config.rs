use std::{collections::HashSet, path::PathBuf, sync::Arc};

use axum::http::{
    HeaderName, HeaderValue, Method,
    header::{CONTENT_DISPOSITION, CONTENT_LENGTH},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use tokio::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, warn};
use url::Url;

use crate::{error::ApiError, strategy::Credentials};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";
const DEFAULT_CLEANUP_GRACE_SECONDS: u64 = 10;
const COOKIE_FILE_NAME: &str = "cookies.txt";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub allowed_origins: Vec<String>,
    pub credentials: Credentials,
    pub download_dir: PathBuf,
    pub ytdlp_path: PathBuf,
    pub cleanup_grace: Duration,
}

impl AppConfig {
    pub async fn from_env() -> Result<Self, ApiError> {
        let data_dir = read_path_env("DATA_DIR").unwrap_or_else(|| PathBuf::from("data"));
        let download_dir =
            read_path_env("DOWNLOAD_DIR").unwrap_or_else(|| PathBuf::from("temp_downloads"));

        tokio::fs::create_dir_all(&data_dir).await.map_err(|error| {
            ApiError::internal(format!("Could not create data directory: {error}"))
        })?;
        tokio::fs::create_dir_all(&download_dir)
            .await
            .map_err(|error| {
                ApiError::internal(format!("Could not create download directory: {error}"))
            })?;

        let proxy_url = read_string_env("PROXY_URL");
        let cookie_file = prepare_cookie_file(
            &data_dir.join(COOKIE_FILE_NAME),
            read_string_env("YOUTUBE_COOKIES_BASE64").as_deref(),
        )
        .await;

        if proxy_url.is_some() {
            info!("PROXY_URL configured: proxy strategies enabled for YouTube.");
        } else {
            warn!("PROXY_URL not configured. YouTube requests will use the direct connection only.");
        }

        Ok(Self {
            bind_addr: resolve_bind_addr(),
            allowed_origins: read_list_env("ALLOWED_ORIGINS"),
            credentials: Credentials {
                proxy_url,
                cookie_file,
            },
            download_dir,
            ytdlp_path: read_path_env("YTDLP_PATH").unwrap_or_else(|| PathBuf::from("yt-dlp")),
            cleanup_grace: Duration::from_secs(
                read_u64_env("CLEANUP_GRACE_SECONDS").unwrap_or(DEFAULT_CLEANUP_GRACE_SECONDS),
            ),
        })
    }
}

pub type SharedConfig = Arc<AppConfig>;

pub fn decode_cookie_payload(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact = payload
        .chars()
        .filter(|character| !character.is_whitespace())
        .collect::<String>();
    STANDARD.decode(compact)
}

/// Writes the configured cookie payload to `path`. Without a payload, a file
/// left there by an earlier run is reused. Failures only disable cookies.
async fn prepare_cookie_file(path: &std::path::Path, payload: Option<&str>) -> Option<PathBuf> {
    let Some(payload) = payload else {
        if path.is_file() {
            info!("Reusing persisted cookie file {:?}", path);
            return Some(path.to_path_buf());
        }
        return None;
    };

    let bytes = match decode_cookie_payload(payload) {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!("YOUTUBE_COOKIES_BASE64 is not valid base64, cookies disabled: {error}");
            return None;
        }
    };

    match tokio::fs::write(path, bytes).await {
        Ok(()) => {
            info!("Cookie file written to {:?}", path);
            Some(path.to_path_buf())
        }
        Err(error) => {
            warn!("Could not write cookie file {:?}, cookies disabled: {error}", path);
            None
        }
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn read_string_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .and_then(|value| non_empty(&value).map(ToString::to_string))
}

fn read_path_env(name: &str) -> Option<PathBuf> {
    read_string_env(name).map(PathBuf::from)
}

fn read_u64_env(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn read_list_env(name: &str) -> Vec<String> {
    std::env::var(name)
        .ok()
        .map(|value| split_list(&value))
        .unwrap_or_default()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn resolve_bind_addr() -> String {
    if let Some(configured) = read_string_env("APP_ADDR") {
        return configured;
    }

    if let Some(port) = std::env::var("PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
    {
        return format!("0.0.0.0:{port}");
    }

    DEFAULT_BIND_ADDR.to_string()
}

pub fn build_cors_layer(configured: &[String]) -> Result<CorsLayer, ApiError> {
    let origins = if configured.is_empty() {
        warn!("ALLOWED_ORIGINS is not set. Falling back to development origins.");
        vec![
            "http://127.0.0.1:5173".to_string(),
            "http://localhost:5173".to_string(),
        ]
    } else {
        configured.to_vec()
    };

    let normalized_origins = origins
        .iter()
        .map(|origin| {
            normalize_origin(origin).ok_or_else(|| {
                ApiError::internal(format!(
                    "Invalid origin in ALLOWED_ORIGINS: {origin}. Use values like https://example.com"
                ))
            })
        })
        .collect::<Result<HashSet<_>, _>>()?;
    let allowed_origins = Arc::new(normalized_origins);
    let allow_origin = AllowOrigin::predicate({
        let allowed_origins = Arc::clone(&allowed_origins);
        move |origin: &HeaderValue, _| {
            let normalized = origin.to_str().ok().and_then(normalize_origin);
            let allowed = normalized
                .as_ref()
                .is_some_and(|value| allowed_origins.contains(value));
            debug!(
                "CORS origin check raw={:?} normalized={:?} allowed={}",
                origin, normalized, allowed
            );
            allowed
        }
    });
    info!(
        "CORS allow-list loaded with {} origin(s): {:?}",
        allowed_origins.len(),
        allowed_origins.iter().collect::<Vec<_>>()
    );

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .expose_headers([
            CONTENT_DISPOSITION,
            CONTENT_LENGTH,
            HeaderName::from_static("x-download-filename"),
        ]))
}

fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    let default_port = match scheme {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };
    let port = parsed.port();

    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    match port.filter(|explicit| *explicit != default_port) {
        Some(port) => Some(format!("{scheme}://{host}:{port}")),
        None => Some(format!("{scheme}://{host}")),
    }
}
