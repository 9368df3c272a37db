use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::platform::Platform;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("yt-dlp is not installed. Install yt-dlp and restart the server.")]
    NotInstalled,
    #[error("could not run yt-dlp: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("{0}")]
    Failed(String),
    #[error("could not parse yt-dlp output: {0}")]
    InvalidOutput(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no extraction strategies available")]
    NoStrategies,
    #[error("all {attempts} strategies failed; last error: {last_error}")]
    AllStrategiesFailed {
        attempts: usize,
        last_error: EngineError,
    },
}

impl ResolveError {
    pub fn last_message(&self) -> String {
        match self {
            ResolveError::NoStrategies => self.to_string(),
            ResolveError::AllStrategiesFailed { last_error, .. } => last_error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unsupported,
    BotDetection,
    AgeRestricted,
    GeoBlocked,
    LoginRequired,
    NotFound,
    Other,
}

const FAILURE_NEEDLES: [(FailureKind, &[&str]); 6] = [
    (FailureKind::Unsupported, &["unsupported url"]),
    (
        FailureKind::BotDetection,
        &[
            "not a bot",
            "bot detection",
            "http error 429",
            "too many requests",
        ],
    ),
    (
        FailureKind::AgeRestricted,
        &[
            "confirm your age",
            "age-restricted",
            "age restricted",
            "inappropriate for some users",
        ],
    ),
    (
        FailureKind::GeoBlocked,
        &["in your country", "geo restrict", "geo-restrict", "geo-blocked"],
    ),
    (
        FailureKind::NotFound,
        &[
            "video unavailable",
            "private video",
            "does not exist",
            "has been removed",
            "deleted",
            "http error 404",
            "not found",
        ],
    ),
    (
        FailureKind::LoginRequired,
        &["login required", "sign in", "log in", "requires authentication"],
    ),
];

impl FailureKind {
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        FAILURE_NEEDLES
            .iter()
            .find(|(_, needles)| needles.iter().any(|needle| lower.contains(needle)))
            .map(|(kind, _)| *kind)
            .unwrap_or(FailureKind::Other)
    }

    pub fn status(self) -> StatusCode {
        match self {
            FailureKind::Unsupported => StatusCode::BAD_REQUEST,
            FailureKind::BotDetection => StatusCode::SERVICE_UNAVAILABLE,
            FailureKind::AgeRestricted | FailureKind::LoginRequired => StatusCode::FORBIDDEN,
            FailureKind::GeoBlocked => StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS,
            FailureKind::NotFound => StatusCode::NOT_FOUND,
            FailureKind::Other => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(self) -> &'static str {
        match self {
            FailureKind::Unsupported => "PLATFORM_UNSUPPORTED",
            FailureKind::BotDetection => "BOT_DETECTED",
            FailureKind::AgeRestricted => "AGE_RESTRICTED",
            FailureKind::GeoBlocked => "GEO_BLOCKED",
            FailureKind::LoginRequired => "LOGIN_REQUIRED",
            FailureKind::NotFound => "NOT_FOUND",
            FailureKind::Other => "ALL_STRATEGIES_FAILED",
        }
    }

    fn user_message(self) -> &'static str {
        match self {
            FailureKind::Unsupported => "This URL is not supported.",
            FailureKind::BotDetection => {
                "The platform is blocking automated requests right now. Try again later."
            }
            FailureKind::AgeRestricted => "This video is age-restricted and cannot be fetched.",
            FailureKind::GeoBlocked => "This video is not available in the server's region.",
            FailureKind::LoginRequired => "This video requires a logged-in account.",
            FailureKind::NotFound => "Video not found. It may be private or deleted.",
            FailureKind::Other => "Failed to fetch video information.",
        }
    }

    /// Only failures a different egress IP can fix.
    fn proxy_may_help(self) -> bool {
        matches!(
            self,
            FailureKind::BotDetection | FailureKind::GeoBlocked | FailureKind::Other
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy_could_help: Option<bool>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: Option<&'static str>,
    pub details: Option<String>,
    pub hint: Option<String>,
    pub proxy_could_help: Option<bool>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: None,
            details: None,
            hint: None,
            proxy_could_help: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: Some("INVALID_INPUT"),
            ..Self::new(StatusCode::BAD_REQUEST, message)
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn from_engine(error: &EngineError) -> Self {
        match error {
            EngineError::NotInstalled | EngineError::Spawn(_) => Self::internal(error.to_string()),
            _ => {
                let message = error.to_string();
                let kind = FailureKind::from_message(&message);
                Self {
                    code: Some(kind.code()),
                    details: Some(message),
                    ..Self::new(kind.status(), kind.user_message())
                }
            }
        }
    }

    pub fn from_resolve(platform: Platform, error: &ResolveError, proxy_configured: bool) -> Self {
        let last_message = error.last_message();
        let kind = FailureKind::from_message(&last_message);
        let mut api_error = Self {
            code: Some(kind.code()),
            details: Some(last_message),
            ..Self::new(kind.status(), kind.user_message())
        };

        if platform.is_youtube() {
            let proxy_could_help = !proxy_configured && kind.proxy_may_help();
            api_error.proxy_could_help = Some(proxy_could_help);
            if proxy_could_help {
                api_error.hint = Some(
                    "YouTube is likely blocking this server. Set PROXY_URL to a residential proxy to enable the proxy strategies."
                        .to_string(),
                );
            }
        }

        api_error
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            success: false,
            error: self.message,
            code: self.code,
            details: self.details,
            hint: self.hint,
            proxy_could_help: self.proxy_could_help,
        });

        (self.status, body).into_response()
    }
}
