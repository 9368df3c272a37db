use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use axum::body::Body;
use chrono::Utc;
use futures::StreamExt;
use tokio::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::ApiError, models::RawMediaInfo, normalize::{carries_audio, is_audio_entry}, platform::Platform,
    rank::MP3_FORMAT_ID,
};

pub const FALLBACK_SELECTOR: &str = "bestvideo+bestaudio/best";
const MAX_FILENAME_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadPlan {
    pub selector: String,
    pub extract_audio: bool,
    pub container: &'static str,
    pub merge: bool,
    pub output_template: PathBuf,
    pub content_type: &'static str,
    /// The requested id no longer matched the fresh metadata.
    pub degraded: bool,
}

fn container_for(ext: Option<&str>) -> &'static str {
    match ext.map(str::to_ascii_lowercase).as_deref() {
        Some("webm") => "webm",
        Some("mov") => "mov",
        Some("m4v") => "m4v",
        Some("m4a") => "m4a",
        Some("mp3") => "mp3",
        Some("aac") => "aac",
        Some("ogg") => "ogg",
        Some("opus") => "opus",
        Some("wav") => "wav",
        Some("flv") => "flv",
        _ => "mp4",
    }
}

fn merge_plan(selector: String, output_template: PathBuf, degraded: bool) -> DownloadPlan {
    DownloadPlan {
        selector,
        extract_audio: false,
        container: "mp4",
        merge: true,
        output_template,
        content_type: "video/mp4",
        degraded,
    }
}

pub fn plan(
    platform: Platform,
    info: &RawMediaInfo,
    format_id: &str,
    output_template: PathBuf,
) -> DownloadPlan {
    let format_id = format_id.trim();

    if format_id == MP3_FORMAT_ID {
        return DownloadPlan {
            selector: "bestaudio".to_string(),
            extract_audio: true,
            container: "mp3",
            merge: false,
            output_template,
            content_type: "audio/mpeg",
            degraded: false,
        };
    }

    if let Some((video_id, audio_id)) = format_id.split_once('+') {
        if info.find_format(video_id).is_some() && info.find_format(audio_id).is_some() {
            return merge_plan(format_id.to_string(), output_template, false);
        }
        warn!(
            "{platform} format {format_id:?} is no longer listed; falling back to {FALLBACK_SELECTOR}"
        );
        return merge_plan(FALLBACK_SELECTOR.to_string(), output_template, true);
    }

    match info.find_format(format_id) {
        Some(format) if carries_audio(format) || is_audio_entry(format) => {
            let container = container_for(format.ext.as_deref());
            DownloadPlan {
                selector: format_id.to_string(),
                extract_audio: false,
                container,
                merge: false,
                output_template,
                content_type: content_type_for_extension(container),
                degraded: false,
            }
        }
        Some(_) => merge_plan(
            format!("{format_id}+bestaudio/{format_id}"),
            output_template,
            false,
        ),
        None => {
            warn!(
                "{platform} format {format_id:?} is no longer listed; falling back to {FALLBACK_SELECTOR}"
            );
            merge_plan(FALLBACK_SELECTOR.to_string(), output_template, true)
        }
    }
}

pub fn sanitize_filename(title: &str) -> String {
    let kept = title
        .chars()
        .filter(|character| {
            character.is_ascii_alphanumeric() || *character == '_' || character.is_whitespace()
        })
        .collect::<String>();

    kept.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .take(MAX_FILENAME_CHARS)
        .collect()
}

pub fn download_stem(platform: Platform, info: &RawMediaInfo) -> String {
    let from_title = info
        .title
        .as_deref()
        .map(sanitize_filename)
        .unwrap_or_default();
    if !from_title.is_empty() {
        return from_title;
    }

    let id = info
        .id
        .as_deref()
        .map(sanitize_filename)
        .filter(|id| !id.is_empty());
    match id {
        Some(id) => format!("{}_{id}", platform.slug()),
        None => format!("{}_download", platform.slug()),
    }
}

pub fn content_type_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "flv" => "video/x-flv",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "wav" => "audio/wav",
        "ogg" | "opus" => "audio/ogg",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}

pub fn build_content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename=\"{filename}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

#[derive(Debug)]
pub struct DownloadJob {
    dir: PathBuf,
    // Armed from creation: an abandoned request still removes the directory.
    guard: CleanupGuard,
}

impl DownloadJob {
    pub async fn create(root: &Path, grace: Duration) -> Result<Self, ApiError> {
        let suffix = Uuid::new_v4().simple().to_string();
        let name = format!("{}-{}", Utc::now().timestamp_millis(), &suffix[..8]);
        let dir = root.join(name);

        tokio::fs::create_dir_all(&dir).await.map_err(|error| {
            ApiError::internal(format!("Could not prepare temporary download: {error}"))
        })?;

        Ok(Self {
            guard: CleanupGuard {
                dir: Some(dir.clone()),
                grace,
            },
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn output_template(&self) -> PathBuf {
        self.dir.join("media.%(ext)s")
    }

    pub async fn resolve_file(&self, printed_path: Option<&str>) -> Result<PathBuf, ApiError> {
        let canonical_dir = tokio::fs::canonicalize(&self.dir).await.map_err(|error| {
            ApiError::internal(format!("Could not resolve temporary directory: {error}"))
        })?;

        if let Some(path_value) = printed_path {
            let path = PathBuf::from(path_value);
            if let Some(valid_path) = confined_file(&canonical_dir, &path).await? {
                return Ok(valid_path);
            }

            let relative_candidate = self.dir.join(path_value);
            if let Some(valid_path) = confined_file(&canonical_dir, &relative_candidate).await? {
                return Ok(valid_path);
            }
        }

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|error| {
            ApiError::internal(format!("Could not open temporary directory: {error}"))
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|error| {
            ApiError::internal(format!("Could not list temporary files: {error}"))
        })? {
            let path = entry.path();
            let partial = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| matches!(ext, "part" | "ytdl" | "temp"));
            if partial {
                continue;
            }
            if let Some(valid_path) = confined_file(&canonical_dir, &path).await? {
                return Ok(valid_path);
            }
        }

        Err(ApiError::internal(
            "The downloaded file could not be found on the server.",
        ))
    }

    pub async fn cleanup(self) {
        let mut guard = self.guard;
        if let Some(dir) = guard.dir.take() {
            remove_job_dir(&dir).await;
        }
    }

    pub fn into_guard(self) -> CleanupGuard {
        self.guard
    }
}

async fn confined_file(canonical_dir: &Path, candidate: &Path) -> Result<Option<PathBuf>, ApiError> {
    let metadata = match tokio::fs::metadata(candidate).await {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(ApiError::internal(format!(
                "Could not read downloaded file: {error}"
            )));
        }
    };

    if !metadata.is_file() {
        return Ok(None);
    }

    let canonical_candidate = tokio::fs::canonicalize(candidate).await.map_err(|error| {
        ApiError::internal(format!("Could not resolve downloaded file path: {error}"))
    })?;

    if !canonical_candidate.starts_with(canonical_dir) {
        warn!(
            "Blocked a file outside the expected temporary directory: {:?}",
            canonical_candidate
        );
        return Ok(None);
    }

    Ok(Some(canonical_candidate))
}

async fn remove_job_dir(dir: &Path) {
    if let Err(error) = tokio::fs::remove_dir_all(dir).await
        && error.kind() != ErrorKind::NotFound
    {
        warn!("Could not clean up temporary directory {:?}: {error}", dir);
    }
}

#[derive(Debug)]
pub struct CleanupGuard {
    dir: Option<PathBuf>,
    grace: Duration,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let grace = self.grace;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(grace).await;
                    remove_job_dir(&dir).await;
                    info!("Removed temporary download {:?}", dir);
                });
            }
            Err(_) => {
                if let Err(error) = std::fs::remove_dir_all(&dir)
                    && error.kind() != ErrorKind::NotFound
                {
                    warn!("Could not clean up temporary directory {:?}: {error}", dir);
                }
            }
        }
    }
}

/// Streams `file` and keeps `guard` alive until the body is finished,
/// failed or abandoned by the client.
pub fn streaming_body(file: tokio::fs::File, guard: CleanupGuard) -> Body {
    let stream = ReaderStream::new(file).map(move |chunk| {
        if let Err(error) = &chunk {
            warn!("Download stream failed for {:?}: {error}", guard.dir);
        }
        chunk
    });

    Body::from_stream(stream)
}
