//! The two ends of every exchange: attaching the bearer token on the way
//! out, and sorting the response into data, unauthorized, or error on the
//! way back.

use http::header::{HeaderValue, AUTHORIZATION};
use http::StatusCode;
use serde_json::Value;
use tracing::warn;

use super::error::ApiError;
use super::transport::{ApiRequest, RawResponse, TransportError};
use crate::models::envelope::{error_message, normalize, ApiResult, UNAUTHORIZED_CODE};
use crate::session::AuthSession;

/// Attaches `Authorization: Bearer <token>` when the session holds a token
/// and strips any stale header otherwise. Returns the token that was sent.
pub fn attach_bearer(request: &mut ApiRequest, session: &AuthSession) -> Option<String> {
    let Some(token) = session.access_token() else {
        request.headers.remove(AUTHORIZATION);
        return None;
    };

    match HeaderValue::from_str(&format!("Bearer {}", token)) {
        Ok(value) => {
            request.headers.insert(AUTHORIZATION, value);
            Some(token)
        }
        Err(e) => {
            warn!("Stored access token is not a valid header value: {}", e);
            request.headers.remove(AUTHORIZATION);
            None
        }
    }
}

/// The verdict on a completed exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum Inspection {
    /// Unwrapped envelope payload
    Data(Value),
    /// Transport 401 or envelope code 401, with the server's message
    Unauthorized(String),
    Failed(ApiError),
}

/// Sorts a transport outcome. A transport-level 401 and an envelope-level
/// 401 are indistinguishable from here on.
pub fn inspect(outcome: Result<RawResponse, TransportError>, success_code: i64) -> Inspection {
    let response = match outcome {
        Ok(response) => response,
        Err(TransportError::Timeout) => return Inspection::Failed(ApiError::Timeout),
        Err(TransportError::Connect(message)) => {
            return Inspection::Failed(ApiError::Offline(message))
        }
        Err(TransportError::Other(message)) => {
            return Inspection::Failed(ApiError::Transport(message))
        }
    };

    let status = response.status;
    if status == StatusCode::UNAUTHORIZED {
        let message = error_message(&response.body).unwrap_or_else(|| "session expired".to_string());
        return Inspection::Unauthorized(message);
    }

    if !status.is_success() {
        let message = error_message(&response.body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
        return Inspection::Failed(ApiError::from_status(status, message));
    }

    match normalize(&response.body, success_code) {
        Ok(ApiResult::Success(data)) => Inspection::Data(data),
        Ok(ApiResult::Failure { code, message }) if code == UNAUTHORIZED_CODE => {
            Inspection::Unauthorized(message)
        }
        Ok(ApiResult::Failure { code, message }) => {
            Inspection::Failed(ApiError::Business { code, message })
        }
        Err(e) => Inspection::Failed(ApiError::Decode(e)),
    }
}
