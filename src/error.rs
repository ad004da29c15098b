//! Error types for the lead funnel.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

/// Top-level error type for the funnel backend.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Lead error: {0}")]
    Lead(#[from] LeadError),

    #[error("Email error: {0}")]
    Email(#[from] EmailError),

    #[error("Analytics error: {0}")]
    Analytics(#[from] AnalyticsError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Chat session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session {id} not found")]
    NotFound { id: Uuid },

    #[error("User information is required")]
    MissingUser,

    #[error("Message and session ID are required")]
    EmptyMessage,

    #[error("Session {id} has ended")]
    Ended { id: Uuid },
}

/// Lead registry errors.
#[derive(Debug, thiserror::Error)]
pub enum LeadError {
    #[error("Lead {id} not found")]
    NotFound { id: Uuid },

    #[error("Name and email are required")]
    MissingFields,

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Lead with this email already exists")]
    DuplicateEmail,

    #[error("Note content is required")]
    EmptyNote,
}

/// Email template/outbox errors.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Template {id} not found")]
    TemplateNotFound { id: String },

    #[error("Email {id} not found")]
    NotFound { id: Uuid },

    #[error("Campaign {id} not found")]
    CampaignNotFound { id: Uuid },

    #[error("Email {id} is {status}, cannot mark as {target}")]
    InvalidTransition {
        id: Uuid,
        status: String,
        target: String,
    },

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Failed to compose message: {0}")]
    Compose(String),
}

/// Funnel analytics errors.
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("Invalid date {value}: expected YYYY-MM-DD or RFC 3339")]
    InvalidDate { value: String },

    #[error("Date range start {start} is after end {end}")]
    InvalidRange { start: String, end: String },

    #[error("Date range of {days} days exceeds the {max} day limit")]
    RangeTooLong { days: i64, max: i64 },
}

/// Result type alias for the funnel.
pub type Result<T> = std::result::Result<T, Error>;

// ── HTTP mapping ────────────────────────────────────────────────────────

/// Error returned from HTTP handlers.
///
/// Renders as `{"success": false, "error": ...}` with a status code derived
/// from the domain error.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn too_many_requests() -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many chat requests from this IP, please try again later.",
        )
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        let status = match e {
            SessionError::NotFound { .. } => StatusCode::NOT_FOUND,
            SessionError::MissingUser | SessionError::EmptyMessage => StatusCode::BAD_REQUEST,
            SessionError::Ended { .. } => StatusCode::CONFLICT,
        };
        Self::new(status, e.to_string())
    }
}

impl From<LeadError> for ApiError {
    fn from(e: LeadError) -> Self {
        let status = match e {
            LeadError::NotFound { .. } => StatusCode::NOT_FOUND,
            LeadError::DuplicateEmail => StatusCode::CONFLICT,
            LeadError::MissingFields | LeadError::InvalidEmail | LeadError::EmptyNote => {
                StatusCode::BAD_REQUEST
            }
        };
        Self::new(status, e.to_string())
    }
}

impl From<EmailError> for ApiError {
    fn from(e: EmailError) -> Self {
        let status = match e {
            EmailError::TemplateNotFound { .. }
            | EmailError::NotFound { .. }
            | EmailError::CampaignNotFound { .. } => StatusCode::NOT_FOUND,
            EmailError::InvalidTransition { .. } => StatusCode::CONFLICT,
            EmailError::InvalidTemplate(_) | EmailError::Compose(_) => StatusCode::BAD_REQUEST,
        };
        Self::new(status, e.to_string())
    }
}

impl From<AnalyticsError> for ApiError {
    fn from(e: AnalyticsError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, e.to_string())
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Session(e) => e.into(),
            Error::Lead(e) => e.into(),
            Error::Email(e) => e.into(),
            Error::Analytics(e) => e.into(),
            Error::Config(e) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "success": false,
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}
