use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{
        HeaderMap, HeaderName, HeaderValue,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    config::SharedConfig,
    engine::MediaEngine,
    error::ApiError,
    executor::{Resolved, resolve},
    models::FormatDescriptor,
    normalize::normalize,
    planner::{
        DownloadJob, build_content_disposition, content_type_for_extension, download_stem, plan,
        streaming_body,
    },
    platform::Platform,
    rank::rank,
    strategy::{strategies_for, youtube_strategy_count},
};

const MAX_DESCRIPTION_CHARS: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub config: SharedConfig,
    pub engine: Arc<dyn MediaEngine>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/api/test", get(test_api))
        .route("/api/video-info", post(video_info))
        .route("/api/download/{format_id}", get(download))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct VideoInfoRequest {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VideoInfoResponse {
    success: bool,
    data: VideoInfoData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfoData {
    platform: Platform,
    title: String,
    video_id: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    uploader: Option<String>,
    views: Option<u64>,
    upload_date: Option<String>,
    description: Option<String>,
    url: String,
    formats: Vec<FormatDescriptor>,
    total_formats_available: usize,
    fetched_with: &'static str,
}

async fn banner() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Media resolver API is running!" }))
}

async fn test_api(State(state): State<AppState>) -> Json<serde_json::Value> {
    let credentials = &state.config.credentials;
    Json(serde_json::json!({
        "success": true,
        "message": "Video API is working!",
        "proxyConfigured": credentials.has_proxy(),
        "cookiesConfigured": credentials.usable_cookie_file().is_some(),
        "youtubeStrategies": youtube_strategy_count(credentials),
    }))
}

fn validate_url(url: Option<&str>) -> Result<&str, ApiError> {
    let url = url.map(str::trim).unwrap_or_default();
    if url.is_empty() {
        return Err(ApiError::bad_request("A video URL is required."));
    }

    let lower = url.to_ascii_lowercase();
    if !lower.starts_with("http://") && !lower.starts_with("https://") {
        return Err(ApiError::bad_request(
            "Please provide a valid URL starting with http:// or https://",
        ));
    }

    Ok(url)
}

async fn resolve_for(state: &AppState, platform: Platform, url: &str) -> Result<Resolved, ApiError> {
    let strategies = strategies_for(platform, &state.config.credentials);
    info!(
        "Resolving {platform} URL {:?} with {} strateg(ies)",
        url,
        strategies.len()
    );

    resolve(state.engine.as_ref(), url, &strategies)
        .await
        .map_err(|error| {
            warn!("Could not resolve {:?}: {error}", url);
            ApiError::from_resolve(platform, &error, state.config.credentials.has_proxy())
        })
}

pub async fn video_info(
    State(state): State<AppState>,
    Json(payload): Json<VideoInfoRequest>,
) -> Result<Json<VideoInfoResponse>, ApiError> {
    let url = validate_url(payload.url.as_deref())?;
    let platform = Platform::classify(url);
    let Resolved { info, strategy } = resolve_for(&state, platform, url).await?;

    let formats = rank(normalize(platform, &info));
    info!(
        "Resolved {} format(s) out of {} for {:?} via {}",
        formats.len(),
        info.formats.len(),
        url,
        strategy.name
    );

    let description = info
        .description
        .map(|text| text.chars().take(MAX_DESCRIPTION_CHARS).collect::<String>());

    Ok(Json(VideoInfoResponse {
        success: true,
        data: VideoInfoData {
            platform,
            title: info
                .title
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| "Untitled".to_string()),
            video_id: info.id,
            duration: info.duration,
            thumbnail: info.thumbnail,
            uploader: info.uploader,
            views: info.view_count,
            upload_date: info.upload_date,
            description,
            url: info.webpage_url.unwrap_or_else(|| url.to_string()),
            total_formats_available: info.formats.len(),
            formats,
            fetched_with: strategy.name,
        },
    }))
}

pub async fn download(
    State(state): State<AppState>,
    Path(format_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    struct PreparedDownload {
        file: tokio::fs::File,
        headers: HeaderMap,
    }

    let url = validate_url(query.url.as_deref())?;
    if format_id.trim().is_empty() {
        return Err(ApiError::bad_request("A format id is required."));
    }

    let platform = Platform::classify(url);
    // Listed format ids may be stale; plan against fresh metadata.
    let Resolved { info, strategy } = resolve_for(&state, platform, url).await?;

    let job = DownloadJob::create(&state.config.download_dir, state.config.cleanup_grace).await?;
    let download_plan = plan(platform, &info, &format_id, job.output_template());
    info!(
        "Downloading {:?} format {:?} as {:?} (degraded={}) via {} into {:?}",
        url,
        format_id,
        download_plan.selector,
        download_plan.degraded,
        strategy.name,
        job.dir()
    );

    let preparation_result: Result<PreparedDownload, ApiError> = async {
        let printed_path = state
            .engine
            .materialize(url, &strategy.options, &download_plan)
            .await
            .map_err(|error| ApiError::from_engine(&error))?;
        let resolved_path = job.resolve_file(printed_path.as_deref()).await?;

        let extension = resolved_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| download_plan.container.to_string());
        let content_type = match content_type_for_extension(&extension) {
            "application/octet-stream" => download_plan.content_type,
            known => known,
        };
        let filename = format!("{}.{extension}", download_stem(platform, &info));

        let metadata = tokio::fs::metadata(&resolved_path).await.map_err(|error| {
            ApiError::internal(format!("Could not read temporary file metadata: {error}"))
        })?;
        let file = tokio::fs::File::open(&resolved_path)
            .await
            .map_err(|error| ApiError::internal(format!("Could not open temporary file: {error}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(
            CONTENT_LENGTH,
            HeaderValue::from_str(&metadata.len().to_string())
                .map_err(|_| ApiError::internal("Could not build the download size header."))?,
        );
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_str(&build_content_disposition(&filename))
                .map_err(|_| ApiError::internal("Could not build the download header."))?,
        );
        headers.insert(
            HeaderName::from_static("x-download-filename"),
            HeaderValue::from_str(&filename)
                .map_err(|_| ApiError::internal("Could not build the filename header."))?,
        );

        Ok(PreparedDownload { file, headers })
    }
    .await;

    match preparation_result {
        Ok(prepared) => {
            let body = streaming_body(prepared.file, job.into_guard());
            Ok((prepared.headers, body).into_response())
        }
        Err(error) => {
            job.cleanup().await;
            Err(error)
        }
    }
}
