//! Client error types

use http::StatusCode;
use thiserror::Error;

use super::notice::NoticeCategory;

/// Every way a call through the client can fail. Errors are `Clone` because
/// a single refresh failure is handed to every request waiting on it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    /// The session is gone and could not be renewed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Any other 4xx
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Backend unreachable: {0}")]
    Offline(String),

    /// The transport succeeded but the envelope carried an error code.
    /// Displays exactly the message the backend sent.
    #[error("{message}")]
    Business { code: i64, message: String },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Failed to encode request body: {0}")]
    Encode(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl ApiError {
    /// Create error from a non-success HTTP status. 401 is not expected
    /// here since it is routed to the refresh logic before this point.
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status.as_u16() {
            401 => Self::Unauthorized(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            s @ 400..=499 => Self::Rejected { status: s, message },
            s => Self::Server { status: s, message },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// The notice shown to the user for this error, if any. Unauthorized
    /// errors navigate away instead of showing a notice.
    pub fn notice_category(&self) -> Option<NoticeCategory> {
        match self {
            Self::Unauthorized(_) | Self::Encode(_) | Self::Configuration(_) => None,
            Self::Forbidden(_) => Some(NoticeCategory::Forbidden),
            Self::NotFound(_) => Some(NoticeCategory::NotFound),
            Self::Rejected { .. } => Some(NoticeCategory::BadRequest),
            Self::Server { .. } | Self::Decode(_) | Self::Transport(_) => {
                Some(NoticeCategory::ServerError)
            }
            Self::Timeout => Some(NoticeCategory::Timeout),
            Self::Offline(_) => Some(NoticeCategory::Offline),
            Self::Business { .. } => Some(NoticeCategory::Business),
        }
    }
}
