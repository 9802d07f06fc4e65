use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::error::ApiError;
use super::interceptors::{attach_bearer, inspect, Inspection};
use super::notice::{Notice, Notifier, TracingNotifier};
use super::refresh::RefreshCoordinator;
use super::transport::{ApiRequest, RequestKind, Transport};
use super::unauthorized::{Navigator, Prompter, TracingNavigator, UnauthorizedHandler};
use crate::config::{ConfigV1, EndpointsConfig};
use crate::models::{Credentials, TokenGrant, UserProfile};
use crate::session::AuthSession;

/// The user-facing side effects of the client: where to navigate when the
/// session ends, how to ask for confirmation, and where notices go.
#[derive(Clone)]
pub struct ClientHooks {
    pub navigator: Arc<dyn Navigator>,
    pub prompter: Option<Arc<dyn Prompter>>,
    pub notifier: Arc<dyn Notifier>,
}

impl ClientHooks {
    /// Hooks that only log: redirects and notices become tracing events.
    pub fn headless(config: &ConfigV1) -> Self {
        Self {
            navigator: Arc::new(TracingNavigator),
            prompter: None,
            notifier: Arc::new(TracingNotifier::new(Duration::from_millis(
                config.notifications.throttle_in_ms,
            ))),
        }
    }
}

/// The authenticated HTTP client. Cheap to clone; clones share the session,
/// the refresh state and the unauthorized handler.
#[derive(Clone)]
pub struct AuthClient {
    transport: Arc<dyn Transport>,
    session: Arc<AuthSession>,
    refresh: Arc<RefreshCoordinator>,
    unauthorized: Arc<UnauthorizedHandler>,
    notifier: Arc<dyn Notifier>,
    endpoints: Arc<EndpointsConfig>,
    success_code: i64,
}

impl AuthClient {
    pub fn new(
        config: &ConfigV1,
        transport: Arc<dyn Transport>,
        session: Arc<AuthSession>,
        hooks: ClientHooks,
    ) -> Self {
        let unauthorized = Arc::new(UnauthorizedHandler::new(
            session.clone(),
            hooks.navigator,
            hooks.prompter,
            config.unauthorized.clone(),
        ));
        let refresh = Arc::new(RefreshCoordinator::new(
            transport.clone(),
            session.clone(),
            unauthorized.clone(),
            config.endpoints.refresh.clone(),
            config.backend.success_code,
            config.refresh.enabled,
        ));

        Self {
            transport,
            session,
            refresh,
            unauthorized,
            notifier: hooks.notifier,
            endpoints: Arc::new(config.endpoints.clone()),
            success_code: config.backend.success_code,
        }
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    pub fn unauthorized_handler(&self) -> &Arc<UnauthorizedHandler> {
        &self.unauthorized
    }

    pub fn refresh_coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.refresh
    }

    /// Sends `request` and returns the unwrapped envelope payload.
    pub async fn send_value(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let span = info_span!(
            "api_request",
            request_id = %Uuid::new_v4(),
            method = %request.method,
            path = %request.path,
        );

        async move {
            let started = Instant::now();
            let result = self.execute(request).await;
            debug!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                success = result.is_ok(),
                "Request finished"
            );
            result
        }
        .instrument(span)
        .await
    }

    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        decode(self.send_value(request).await?)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::post(path).json(encode(body)?)).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::put(path).json(encode(body)?)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::delete(path)).await
    }

    /// Signs in and starts a new session. The profile comes from the login
    /// response when it carries one, otherwise from the profile endpoint.
    /// If that fetch fails the new session is discarded again.
    pub async fn login(&self, credentials: &Credentials) -> Result<UserProfile, ApiError> {
        let request = ApiRequest::post(self.endpoints.login.as_str())
            .json(encode(credentials)?)
            .kind(RequestKind::Login);
        let grant: TokenGrant = self.send(request).await?;

        self.session
            .establish(grant.token, grant.refresh_token, grant.user.clone());
        self.unauthorized.rearm();
        info!(username = %credentials.username, "Signed in");

        match grant.user {
            Some(user) => Ok(user),
            None => self.current_user().await.inspect_err(|e| {
                warn!("Profile unavailable after sign-in, discarding session: {}", e);
                self.session.clear();
            }),
        }
    }

    /// Ends the session. The backend is told when possible, but the local
    /// session is cleared either way.
    pub async fn logout(&self) {
        if self.session.is_authenticated() {
            let request = ApiRequest::post(self.endpoints.logout.as_str()).kind(RequestKind::Logout);
            if let Err(e) = self.send_value(request).await {
                debug!("Logout call failed, clearing session anyway: {}", e);
            }
        }
        self.session.clear();
        info!("Signed out");
    }

    /// Fetches the signed-in user's profile and caches it in the session.
    pub async fn current_user(&self) -> Result<UserProfile, ApiError> {
        let user: UserProfile = self.get(&self.endpoints.profile).await?;
        self.session
            .set_user(user.clone())
            .map_err(|e| ApiError::Unauthorized(e.to_string()))?;
        Ok(user)
    }

    async fn execute(&self, mut request: ApiRequest) -> Result<Value, ApiError> {
        loop {
            let sent_with = attach_bearer(&mut request, &self.session);
            let outcome = self.transport.send(&request).await;

            match inspect(outcome, self.success_code) {
                Inspection::Data(data) => return Ok(data),
                Inspection::Failed(error) => {
                    self.report(request.kind, &error);
                    return Err(error);
                }
                Inspection::Unauthorized(message) if request.kind != RequestKind::Standard => {
                    debug!(kind = ?request.kind, "Unauthorized; not eligible for refresh");
                    return Err(ApiError::Unauthorized(message));
                }
                Inspection::Unauthorized(message) if request.retried => {
                    info!("Request rejected again after token renewal");
                    self.unauthorized.handle().await;
                    return Err(ApiError::Unauthorized(message));
                }
                Inspection::Unauthorized(_) => {
                    request.retried = true;
                    self.refresh.renew(sent_with.as_deref()).await?;
                    debug!("Replaying request with renewed token");
                }
            }
        }
    }

    fn report(&self, kind: RequestKind, error: &ApiError) {
        if kind == RequestKind::Logout {
            return;
        }
        if let Some(notice) = Notice::from_error(error) {
            self.notifier.notify(&notice);
        }
    }
}

fn encode(body: &impl Serialize) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Encode(e.to_string()))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}
