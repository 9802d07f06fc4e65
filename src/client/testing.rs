//! In-process doubles for the client's collaborators.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use http::StatusCode;
use serde_json::{json, Value};
use tokio::sync::{Notify, Semaphore};

use super::notice::{Notice, Notifier};
use super::transport::{ApiRequest, RawResponse, Transport, TransportError};
use super::unauthorized::{LoginRedirect, Navigator, Prompter};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const PROFILE_PATH: &str = "/user/info";

/// What the fake backend answers to a refresh call.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Grant {
        token: String,
        refresh_token: Option<String>,
    },
    /// Envelope code 401: the refresh token is no longer accepted.
    Rejected,
    /// The connection fails.
    Offline,
    /// The transport itself blows up.
    Panic,
}

impl RefreshOutcome {
    pub fn grant(token: &str, refresh_token: Option<&str>) -> Self {
        Self::Grant {
            token: token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
        }
    }
}

/// A scripted backend. Protected paths accept exactly one token; the refresh
/// endpoint answers per [`RefreshOutcome`] and can be held open until the
/// test releases it.
pub struct FakeBackend {
    valid_token: Mutex<Option<String>>,
    refresh: RefreshOutcome,
    gate: Option<Semaphore>,
    refresh_started: Notify,
    refresh_calls: AtomicU64,
    refresh_bodies: Mutex<Vec<String>>,
    seen: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeBackend {
    /// Refresh answers immediately. No token is valid until a refresh
    /// grants one.
    pub fn new(refresh: RefreshOutcome) -> Self {
        Self {
            valid_token: Mutex::new(None),
            refresh,
            gate: None,
            refresh_started: Notify::new(),
            refresh_calls: AtomicU64::new(0),
            refresh_bodies: Mutex::new(Vec::new()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Refresh calls block until [`release_refresh`](Self::release_refresh).
    pub fn held(refresh: RefreshOutcome) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new(refresh)
        }
    }

    pub async fn wait_for_refresh(&self) {
        self.refresh_started.notified().await;
    }

    pub fn release_refresh(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(64);
        }
    }

    pub fn refresh_calls(&self) -> u64 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn last_refresh_body(&self) -> Option<String> {
        self.refresh_bodies.lock().unwrap().last().cloned()
    }

    /// Path and bearer token of every request received, in order.
    pub fn seen(&self) -> Vec<(String, Option<String>)> {
        self.seen.lock().unwrap().clone()
    }

    async fn answer_refresh(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(body) = &request.body {
            self.refresh_bodies.lock().unwrap().push(body.to_string());
        }
        self.refresh_started.notify_one();

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        match &self.refresh {
            RefreshOutcome::Grant {
                token,
                refresh_token,
            } => {
                *self.valid_token.lock().unwrap() = Some(token.clone());
                Ok(envelope(json!({"token": token, "refreshToken": refresh_token})))
            }
            RefreshOutcome::Rejected => Ok(RawResponse::new(
                StatusCode::OK,
                r#"{"code":401,"message":"refresh token expired"}"#,
            )),
            RefreshOutcome::Offline => Err(TransportError::Connect("connection refused".into())),
            RefreshOutcome::Panic => panic!("refresh transport exploded"),
        }
    }
}

fn envelope(data: Value) -> RawResponse {
    RawResponse::new(
        StatusCode::OK,
        json!({"code": 0, "message": "ok", "data": data}).to_string(),
    )
}

#[async_trait]
impl Transport for FakeBackend {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        let bearer = request.bearer_token().map(str::to_string);
        self.seen
            .lock()
            .unwrap()
            .push((request.path.clone(), bearer.clone()));

        match request.path.as_str() {
            REFRESH_PATH => self.answer_refresh(request).await,
            LOGIN_PATH => {
                let password = request
                    .body
                    .as_ref()
                    .and_then(|body| body.get("password"))
                    .and_then(Value::as_str);
                if password != Some("secret") {
                    return Ok(RawResponse::new(
                        StatusCode::UNAUTHORIZED,
                        r#"{"code":401,"message":"wrong username or password"}"#,
                    ));
                }
                *self.valid_token.lock().unwrap() = Some("T1".into());
                Ok(envelope(json!({"token": "T1", "refreshToken": "R1"})))
            }
            LOGOUT_PATH => Ok(envelope(Value::Null)),
            "/public" => Ok(envelope(json!("welcome"))),
            "/locked" => Ok(RawResponse::new(StatusCode::UNAUTHORIZED, "")),
            "/missing" => Ok(RawResponse::new(StatusCode::NOT_FOUND, "")),
            "/full" => Ok(RawResponse::new(
                StatusCode::OK,
                r#"{"code":1003,"message":"Course is full"}"#,
            )),
            path => {
                let valid = self.valid_token.lock().unwrap().clone();
                if bearer.is_none() || bearer != valid {
                    return Ok(RawResponse::new(StatusCode::UNAUTHORIZED, ""));
                }
                if path == PROFILE_PATH {
                    return Ok(envelope(
                        json!({"id": 7, "role": "student", "name": "Alan"}),
                    ));
                }
                Ok(envelope(json!({"path": path})))
            }
        }
    }
}

/// Remembers every redirect instead of navigating.
#[derive(Default)]
pub struct RecordingNavigator {
    location: Option<String>,
    redirects: Mutex<Vec<LoginRedirect>>,
}

impl RecordingNavigator {
    pub fn at(location: &str) -> Self {
        Self {
            location: Some(location.to_string()),
            redirects: Mutex::new(Vec::new()),
        }
    }

    pub fn uris(&self) -> Vec<String> {
        self.redirects
            .lock()
            .unwrap()
            .iter()
            .map(LoginRedirect::to_uri)
            .collect()
    }
}

impl Navigator for RecordingNavigator {
    fn current_location(&self) -> Option<String> {
        self.location.clone()
    }

    fn redirect(&self, target: &LoginRedirect) {
        self.redirects.lock().unwrap().push(target.clone());
    }
}

/// A prompt that stays up until the test dismisses it.
pub struct GatedPrompter {
    shown: AtomicUsize,
    visible: Notify,
    dismissed: Semaphore,
}

impl GatedPrompter {
    pub fn new() -> Self {
        Self {
            shown: AtomicUsize::new(0),
            visible: Notify::new(),
            dismissed: Semaphore::new(0),
        }
    }

    pub async fn wait_until_shown(&self) {
        self.visible.notified().await;
    }

    pub fn release(&self) {
        self.dismissed.add_permits(1);
    }

    pub fn shown(&self) -> usize {
        self.shown.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prompter for GatedPrompter {
    async fn acknowledge(&self, _message: &str) {
        self.shown.fetch_add(1, Ordering::SeqCst);
        self.visible.notify_one();
        self.dismissed.acquire().await.unwrap().forget();
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}
