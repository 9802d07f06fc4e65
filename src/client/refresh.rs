//! Single-flight token refresh.
//!
//! Every request that hits a 401 lands in [`RefreshCoordinator::renew`]. The
//! first one while idle starts the refresh; the rest queue behind it. The
//! refresh runs on its own task, so it completes and drains the queue even
//! when the request that started it has been dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::{debug, info, info_span, warn, Instrument};

use super::error::ApiError;
use super::interceptors::{inspect, Inspection};
use super::transport::{ApiRequest, RequestKind, Transport};
use super::unauthorized::UnauthorizedHandler;
use crate::models::token::{RefreshRequest, TokenGrant};
use crate::session::AuthSession;

type Waiter = oneshot::Sender<Result<String, ApiError>>;

enum RefreshState {
    Idle,
    /// Waiters in the order their requests failed.
    Refreshing(Vec<Waiter>),
}

pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    session: Arc<AuthSession>,
    unauthorized: Arc<UnauthorizedHandler>,
    refresh_path: String,
    success_code: i64,
    enabled: bool,
    state: Mutex<RefreshState>,
    refresh_calls: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        session: Arc<AuthSession>,
        unauthorized: Arc<UnauthorizedHandler>,
        refresh_path: impl Into<String>,
        success_code: i64,
        enabled: bool,
    ) -> Self {
        Self {
            transport,
            session,
            unauthorized,
            refresh_path: refresh_path.into(),
            success_code,
            enabled,
            state: Mutex::new(RefreshState::Idle),
            refresh_calls: AtomicU64::new(0),
        }
    }

    /// Resolves to the token a request that failed with 401 should be
    /// replayed with. `sent_with` is the token that request carried.
    ///
    /// A request that went out with a token that has since been replaced is
    /// answered with the current token straight away; no refresh starts.
    pub async fn renew(self: &Arc<Self>, sent_with: Option<&str>) -> Result<String, ApiError> {
        let (waiter, receiver) = oneshot::channel();
        {
            let mut state = self.lock_state();
            match &mut *state {
                RefreshState::Refreshing(waiters) => {
                    waiters.push(waiter);
                    debug!(queued = waiters.len(), "Waiting for token refresh in flight");
                }
                RefreshState::Idle => {
                    if let Some(current) = self.session.access_token() {
                        if sent_with != Some(current.as_str()) {
                            debug!("Token changed since the request was sent; replaying");
                            return Ok(current);
                        }
                    }

                    *state = RefreshState::Refreshing(vec![waiter]);
                    let coordinator = Arc::clone(self);
                    tokio::spawn(
                        async move { coordinator.run_refresh().await }
                            .instrument(info_span!("token_refresh")),
                    );
                }
            }
        }

        receiver
            .await
            .unwrap_or_else(|_| Err(ApiError::Unauthorized("token refresh was abandoned".into())))
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock_state(), RefreshState::Refreshing(_))
    }

    /// Requests currently waiting on the refresh in flight.
    pub fn queued(&self) -> usize {
        match &*self.lock_state() {
            RefreshState::Refreshing(waiters) => waiters.len(),
            RefreshState::Idle => 0,
        }
    }

    /// Refresh calls actually sent to the backend.
    pub fn refresh_calls(&self) -> u64 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    async fn run_refresh(self: Arc<Self>) {
        let mut in_flight = InFlight {
            coordinator: &self,
            drained: false,
        };

        match self.request_new_token().await {
            Ok(grant) => {
                info!(rotated = grant.refresh_token.is_some(), "Access token refreshed");
                self.session.store_tokens(grant.token.clone(), grant.refresh_token);
                in_flight.finish(Ok(grant.token));
            }
            Err(error) => {
                warn!("Token refresh failed: {}", error);
                // Claim the episode before waking anyone, so a woken request
                // that fails again cannot start a second one.
                let owns_episode = self.unauthorized.begin();
                in_flight.finish(Err(error));
                if owns_episode {
                    self.unauthorized.complete().await;
                }
            }
        }
    }

    async fn request_new_token(&self) -> Result<TokenGrant, ApiError> {
        if !self.enabled {
            return Err(ApiError::Unauthorized("token refresh is disabled".into()));
        }
        let Some(refresh_token) = self.session.refresh_token() else {
            return Err(ApiError::Unauthorized("no refresh token stored".into()));
        };

        let body = serde_json::to_value(RefreshRequest {
            refresh_token: &refresh_token,
        })
        .map_err(|e| ApiError::Encode(e.to_string()))?;
        let request = ApiRequest::post(self.refresh_path.as_str())
            .json(body)
            .kind(RequestKind::Refresh);

        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        match inspect(self.transport.send(&request).await, self.success_code) {
            Inspection::Data(data) => serde_json::from_value(data)
                .map_err(|e| ApiError::Decode(format!("invalid refresh response: {}", e))),
            Inspection::Unauthorized(message) => Err(ApiError::Unauthorized(message)),
            Inspection::Failed(error) => Err(error),
        }
    }

    /// Hands `outcome` to every waiter, oldest first, and goes back to idle.
    fn drain(&self, outcome: Result<String, ApiError>) {
        let waiters = match std::mem::replace(&mut *self.lock_state(), RefreshState::Idle) {
            RefreshState::Refreshing(waiters) => waiters,
            RefreshState::Idle => Vec::new(),
        };

        debug!(waiters = waiters.len(), success = outcome.is_ok(), "Draining refresh queue");
        for waiter in waiters {
            // A dropped receiver means the caller went away.
            let _ = waiter.send(outcome.clone());
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RefreshState> {
        self.state.lock().expect("refresh state mutex poisoned")
    }
}

/// Drains the queue when the refresh ends, however it ends.
struct InFlight<'a> {
    coordinator: &'a RefreshCoordinator,
    drained: bool,
}

impl InFlight<'_> {
    fn finish(&mut self, outcome: Result<String, ApiError>) {
        self.drained = true;
        self.coordinator.drain(outcome);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.drained {
            warn!("Token refresh aborted; failing queued requests");
            self.coordinator
                .drain(Err(ApiError::Unauthorized("token refresh aborted".into())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{FakeBackend, RecordingNavigator, RefreshOutcome, REFRESH_PATH};
    use crate::client::unauthorized::EpisodePhase;
    use crate::config::UnauthorizedConfig;
    use crate::session::MemoryStorage;

    struct Fixture {
        backend: Arc<FakeBackend>,
        session: Arc<AuthSession>,
        navigator: Arc<RecordingNavigator>,
        unauthorized: Arc<UnauthorizedHandler>,
        coordinator: Arc<RefreshCoordinator>,
    }

    fn fixture(backend: FakeBackend, refresh_token: Option<&str>, enabled: bool) -> Fixture {
        let backend = Arc::new(backend);
        let session = Arc::new(AuthSession::restore(Arc::new(MemoryStorage::new())));
        session.establish("T1".into(), refresh_token.map(str::to_string), None);

        let navigator = Arc::new(RecordingNavigator::default());
        let unauthorized = Arc::new(UnauthorizedHandler::new(
            session.clone(),
            navigator.clone(),
            None,
            UnauthorizedConfig::default(),
        ));
        let coordinator = Arc::new(RefreshCoordinator::new(
            backend.clone(),
            session.clone(),
            unauthorized.clone(),
            REFRESH_PATH,
            0,
            enabled,
        ));

        Fixture {
            backend,
            session,
            navigator,
            unauthorized,
            coordinator,
        }
    }

    fn spawn_renewals(
        coordinator: &Arc<RefreshCoordinator>,
        count: usize,
    ) -> Vec<tokio::task::JoinHandle<Result<String, ApiError>>> {
        (0..count)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.renew(Some("T1")).await })
            })
            .collect()
    }

    async fn wait_for_queue(coordinator: &RefreshCoordinator, len: usize) {
        while coordinator.queued() < len {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_concurrent_failures_share_one_refresh() {
        let fx = fixture(
            FakeBackend::held(RefreshOutcome::grant("T2", None)),
            Some("R1"),
            true,
        );

        let first = spawn_renewals(&fx.coordinator, 5);
        fx.backend.wait_for_refresh().await;
        wait_for_queue(&fx.coordinator, 5).await;

        // A sixth failure while the refresh is outstanding queues as well.
        let late = spawn_renewals(&fx.coordinator, 1);
        wait_for_queue(&fx.coordinator, 6).await;
        assert_eq!(fx.backend.refresh_calls(), 1);

        fx.backend.release_refresh();
        for handle in first.into_iter().chain(late) {
            assert_eq!(handle.await.unwrap(), Ok("T2".to_string()));
        }

        assert_eq!(fx.backend.refresh_calls(), 1);
        assert_eq!(fx.coordinator.refresh_calls(), 1);
        assert!(!fx.coordinator.is_refreshing());
        assert_eq!(fx.session.access_token().as_deref(), Some("T2"));
        assert_eq!(fx.session.refresh_token().as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_stored() {
        let fx = fixture(
            FakeBackend::new(RefreshOutcome::grant("T2", Some("R2"))),
            Some("R1"),
            true,
        );

        assert_eq!(fx.coordinator.renew(Some("T1")).await, Ok("T2".to_string()));
        assert_eq!(fx.session.refresh_token().as_deref(), Some("R2"));
        assert_eq!(fx.backend.last_refresh_body(), Some(r#"{"refreshToken":"R1"}"#.to_string()));
    }

    #[tokio::test]
    async fn test_failed_refresh_rejects_everyone_and_redirects_once() {
        let fx = fixture(FakeBackend::held(RefreshOutcome::Offline), Some("R1"), true);

        let handles = spawn_renewals(&fx.coordinator, 5);
        fx.backend.wait_for_refresh().await;
        wait_for_queue(&fx.coordinator, 5).await;
        fx.backend.release_refresh();

        for handle in handles {
            assert!(matches!(handle.await.unwrap(), Err(ApiError::Offline(_))));
        }
        assert_eq!(fx.navigator.uris().len(), 1);
        assert_eq!(fx.unauthorized.phase(), EpisodePhase::Redirected);
        assert!(!fx.session.is_authenticated());
        assert!(!fx.coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_rejected_refresh_token_is_unauthorized() {
        let fx = fixture(FakeBackend::new(RefreshOutcome::Rejected), Some("R1"), true);

        let result = fx.coordinator.renew(Some("T1")).await;

        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
        assert_eq!(fx.navigator.uris().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_token_is_replayed_without_refresh() {
        let fx = fixture(FakeBackend::new(RefreshOutcome::Rejected), Some("R1"), true);
        fx.session.store_tokens("T2".into(), None);

        assert_eq!(fx.coordinator.renew(Some("T1")).await, Ok("T2".to_string()));
        assert_eq!(fx.backend.refresh_calls(), 0);
        assert!(fx.navigator.uris().is_empty());
    }

    #[tokio::test]
    async fn test_missing_refresh_token_goes_straight_to_logout() {
        let fx = fixture(FakeBackend::new(RefreshOutcome::grant("T2", None)), None, true);

        let result = fx.coordinator.renew(Some("T1")).await;

        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
        assert_eq!(fx.backend.refresh_calls(), 0);
        assert_eq!(fx.navigator.uris().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_refresh_deduplicates_logout() {
        let fx = fixture(FakeBackend::new(RefreshOutcome::grant("T2", None)), Some("R1"), false);

        let handles = spawn_renewals(&fx.coordinator, 3);
        for handle in handles {
            assert!(matches!(handle.await.unwrap(), Err(ApiError::Unauthorized(_))));
        }

        assert_eq!(fx.backend.refresh_calls(), 0);
        assert_eq!(fx.navigator.uris().len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_refresh_still_drains_queue() {
        let fx = fixture(FakeBackend::held(RefreshOutcome::Panic), Some("R1"), true);

        let handles = spawn_renewals(&fx.coordinator, 3);
        fx.backend.wait_for_refresh().await;
        wait_for_queue(&fx.coordinator, 3).await;
        fx.backend.release_refresh();

        for handle in handles {
            assert_eq!(
                handle.await.unwrap(),
                Err(ApiError::Unauthorized("token refresh aborted".into()))
            );
        }
        assert!(!fx.coordinator.is_refreshing());
    }
}
