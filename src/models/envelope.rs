use serde::Deserialize;
use serde_json::Value;

/// Envelope code the backend uses to say the session is no longer valid.
/// Treated exactly like a transport-level 401.
pub const UNAUTHORIZED_CODE: i64 = 401;

/// The `{code, message, data}` wrapper every backend response comes in.
#[derive(Deserialize, Debug)]
pub struct Envelope {
    pub code: Option<i64>,
    #[serde(default, alias = "msg")]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// A response body after normalization: either the unwrapped payload or the
/// business error the backend reported.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResult {
    Success(Value),
    Failure { code: i64, message: String },
}

impl ApiResult {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiResult::Failure { code, .. } if *code == UNAUTHORIZED_CODE)
    }
}

/// Turns a raw response body into an [`ApiResult`]. `success_code` is the one
/// envelope code that counts as success; a body without any code is rejected
/// rather than guessed at. An empty body is a success without payload.
pub fn normalize(body: &[u8], success_code: i64) -> Result<ApiResult, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ApiResult::Success(Value::Null));
    }

    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|e| format!("Failed to parse response envelope: {}", e))?;

    let code = envelope
        .code
        .ok_or_else(|| "Response envelope has no code".to_string())?;

    if code == success_code {
        Ok(ApiResult::Success(envelope.data))
    } else {
        let message = envelope
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("Request failed with code {}", code));
        Ok(ApiResult::Failure { code, message })
    }
}

/// Best-effort extraction of a human readable message from an error body,
/// which may or may not be an envelope.
pub fn error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<Envelope>(body)
        .ok()
        .and_then(|envelope| envelope.message)
        .filter(|m| !m.trim().is_empty())
}
