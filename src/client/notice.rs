use std::fmt;
use std::time::Duration;

use tracing::warn;

use super::error::ApiError;
use crate::utils::Throttle;

/// The label a notice is shown under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeCategory {
    Forbidden,
    NotFound,
    BadRequest,
    ServerError,
    Timeout,
    Offline,
    Business,
}

impl NoticeCategory {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Forbidden => "forbidden",
            Self::NotFound => "not-found",
            Self::BadRequest => "bad-request",
            Self::ServerError => "server-error",
            Self::Timeout => "timeout",
            Self::Offline => "offline",
            Self::Business => "business",
        }
    }
}

impl fmt::Display for NoticeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A transient, non-blocking message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub category: NoticeCategory,
    pub message: String,
}

impl Notice {
    /// Builds the notice for a failed request. Errors carrying a message the
    /// user can act on keep it; transport-level failures get a fixed text.
    pub fn from_error(error: &ApiError) -> Option<Notice> {
        let category = error.notice_category()?;
        let message = match (category, error) {
            (NoticeCategory::Forbidden, _) => "You do not have permission to do that.".to_string(),
            (NoticeCategory::NotFound, _) => "The requested resource does not exist.".to_string(),
            (NoticeCategory::ServerError, _) => {
                "Something went wrong on the server, please try again later.".to_string()
            }
            (NoticeCategory::Timeout, _) => "The request timed out, please try again.".to_string(),
            (NoticeCategory::Offline, _) => {
                "Cannot reach the server, check your network connection.".to_string()
            }
            (_, ApiError::Rejected { message, .. }) | (_, ApiError::Business { message, .. }) => {
                message.clone()
            }
            (_, other) => other.to_string(),
        };
        Some(Notice { category, message })
    }
}

/// Presents notices to the user. Implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Emits notices as `warn!` events. Identical notices arriving in a burst
/// (ten requests failing because the network dropped) are shown once.
pub struct TracingNotifier {
    throttle: Throttle,
}

impl TracingNotifier {
    pub fn new(window: Duration) -> Self {
        Self {
            throttle: Throttle::new(window),
        }
    }
}

impl Notifier for TracingNotifier {
    fn notify(&self, notice: &Notice) {
        let key = format!("{}:{}", notice.category, notice.message);
        if let Some(suppressed_count) = self.throttle.should_emit(&key) {
            warn!(
                event_name = "client.notice",
                category = notice.category.label(),
                suppressed_count,
                "{}",
                notice.message
            );
        }
    }
}
