use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{UnauthorizedConfig, UnauthorizedMode};
use crate::session::AuthSession;

/// Where the user is sent once the session cannot be recovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRedirect {
    pub route: String,
    pub return_to_param: String,
    /// Location to come back to after signing in.
    pub return_to: Option<String>,
}

impl LoginRedirect {
    /// The login route with the return path encoded into its query string.
    pub fn to_uri(&self) -> String {
        match &self.return_to {
            None => self.route.clone(),
            Some(path) => {
                let query = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair(&self.return_to_param, path)
                    .finish();
                let separator = if self.route.contains('?') { '&' } else { '?' };
                format!("{}{}{}", self.route, separator, query)
            }
        }
    }
}

/// Performs the navigation to the login entry point.
pub trait Navigator: Send + Sync {
    /// The location the user is currently looking at, if known.
    fn current_location(&self) -> Option<String> {
        None
    }

    fn redirect(&self, target: &LoginRedirect);
}

/// Shows the expiry message and resolves once the user has acknowledged it.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn acknowledge(&self, message: &str);
}

/// Navigator for headless use: the redirect is only logged.
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn redirect(&self, target: &LoginRedirect) {
        warn!(
            event_name = "client.session.redirect",
            target = %target.to_uri(),
            "Session expired; sign in again"
        );
    }
}

/// Where the current unauthorized episode stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodePhase {
    /// No episode running; the next unauthorized failure starts one.
    Armed,
    /// Session cleared, waiting for the user to acknowledge.
    PendingConfirmation,
    /// Redirect issued. Stays here until a new session is established.
    Redirected,
}

/// Ends the session when it cannot be recovered. However many requests fail
/// at once, each episode clears the session and redirects exactly once.
pub struct UnauthorizedHandler {
    session: Arc<AuthSession>,
    navigator: Arc<dyn Navigator>,
    prompter: Option<Arc<dyn Prompter>>,
    config: UnauthorizedConfig,
    phase: Mutex<EpisodePhase>,
    redirects: AtomicU64,
}

impl UnauthorizedHandler {
    pub fn new(
        session: Arc<AuthSession>,
        navigator: Arc<dyn Navigator>,
        prompter: Option<Arc<dyn Prompter>>,
        config: UnauthorizedConfig,
    ) -> Self {
        if config.mode == UnauthorizedMode::Confirm && prompter.is_none() {
            warn!("Unauthorized mode is 'confirm' but no prompter is available; redirecting silently");
        }

        Self {
            session,
            navigator,
            prompter,
            config,
            phase: Mutex::new(EpisodePhase::Armed),
            redirects: AtomicU64::new(0),
        }
    }

    pub fn phase(&self) -> EpisodePhase {
        *self.phase.lock().expect("unauthorized phase mutex poisoned")
    }

    /// Redirects issued over the lifetime of the handler.
    pub fn redirect_count(&self) -> u64 {
        self.redirects.load(Ordering::SeqCst)
    }

    /// Makes the handler ready for the next episode. Called when a new
    /// session is established.
    pub fn rearm(&self) {
        let mut phase = self.phase.lock().expect("unauthorized phase mutex poisoned");
        if *phase != EpisodePhase::Armed {
            debug!(previous = ?*phase, "Unauthorized handler re-armed");
        }
        *phase = EpisodePhase::Armed;
    }

    /// Runs a whole episode. Returns `false` when one is already running,
    /// in which case nothing happens.
    pub async fn handle(&self) -> bool {
        if !self.begin() {
            return false;
        }
        self.complete().await;
        true
    }

    /// Claims the episode and clears the session. Only the caller that gets
    /// `true` may go on to [`complete`](Self::complete).
    pub(crate) fn begin(&self) -> bool {
        let mut phase = self.phase.lock().expect("unauthorized phase mutex poisoned");
        if *phase != EpisodePhase::Armed {
            debug!(phase = ?*phase, "Unauthorized episode already in progress");
            return false;
        }

        *phase = if self.prompter().is_some() {
            EpisodePhase::PendingConfirmation
        } else {
            EpisodePhase::Redirected
        };
        self.session.clear();
        info!("Session is no longer valid; cleared local session");
        true
    }

    /// Prompts (in confirm mode) and redirects.
    pub(crate) async fn complete(&self) {
        let return_to = if self.config.preserve_return_path {
            self.navigator
                .current_location()
                .filter(|location| !is_login_location(location, &self.config.login_route))
        } else {
            None
        };

        if let Some(prompter) = self.prompter() {
            prompter.acknowledge(&self.config.message).await;
            let mut phase = self.phase.lock().expect("unauthorized phase mutex poisoned");
            // A sign-in during the prompt re-armed the handler for the new session.
            if *phase == EpisodePhase::PendingConfirmation {
                *phase = EpisodePhase::Redirected;
            }
        }

        let target = LoginRedirect {
            route: self.config.login_route.clone(),
            return_to_param: self.config.return_to_param.clone(),
            return_to,
        };
        self.redirects.fetch_add(1, Ordering::SeqCst);
        info!(target = %target.to_uri(), "Redirecting to login");
        self.navigator.redirect(&target);
    }

    fn prompter(&self) -> Option<&Arc<dyn Prompter>> {
        match self.config.mode {
            UnauthorizedMode::Confirm => self.prompter.as_ref(),
            UnauthorizedMode::Redirect => None,
        }
    }
}

/// Whether `location` is the login route itself, with or without a query,
/// fragment or trailing slash.
fn is_login_location(location: &str, login_route: &str) -> bool {
    match location.strip_prefix(login_route) {
        Some(rest) => rest.is_empty() || rest.starts_with(['?', '#', '/']),
        None => false,
    }
}
