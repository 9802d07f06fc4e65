use std::sync::{Arc, RwLock, RwLockWriteGuard};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::base::{
    SessionStorage, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, ROLE_KEY, SESSION_KEYS, USER_PROFILE_KEY,
};
use crate::models::UserProfile;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no active session")]
    NotAuthenticated,
}

/// What the session currently holds. `user` is only ever set while
/// `access_token` is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<UserProfile>,
}

/// The one session object of an application: token store plus the cached
/// profile, written through to a [`SessionStorage`].
///
/// Every mutation updates memory and storage while holding the state lock,
/// so readers never see a half-applied change and storage never holds a
/// partial session.
pub struct AuthSession {
    storage: Arc<dyn SessionStorage>,
    state: RwLock<SessionState>,
}

impl AuthSession {
    /// Rebuilds the session from whatever `storage` holds.
    pub fn restore(storage: Arc<dyn SessionStorage>) -> Self {
        let access_token = storage.get(ACCESS_TOKEN_KEY);
        let refresh_token = storage.get(REFRESH_TOKEN_KEY);
        let user = storage
            .get(USER_PROFILE_KEY)
            .and_then(|raw| match serde_json::from_str::<UserProfile>(&raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!("Discarding unreadable stored user profile: {}", e);
                    None
                }
            });

        let session = Self {
            storage,
            state: RwLock::new(SessionState::default()),
        };

        match access_token {
            Some(access_token) => {
                info!(
                    storage = session.storage.name(),
                    has_refresh_token = refresh_token.is_some(),
                    has_user = user.is_some(),
                    "Restored session"
                );
                *session.write_state() = SessionState {
                    access_token: Some(access_token),
                    refresh_token,
                    user,
                };
            }
            None if refresh_token.is_some() || user.is_some() => {
                warn!("Stored session has no access token; clearing leftovers");
                session.clear();
            }
            None => debug!(storage = session.storage.name(), "No stored session"),
        }

        session
    }

    pub fn access_token(&self) -> Option<String> {
        self.read_state().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read_state().refresh_token.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.read_state().user.clone()
    }

    pub fn role(&self) -> Option<String> {
        self.read_state()
            .user
            .as_ref()
            .map(|user| user.role.clone())
            .filter(|role| !role.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_state().access_token.is_some()
    }

    pub fn snapshot(&self) -> SessionState {
        self.read_state().clone()
    }

    /// Replaces the access token. `None` ends the session, same as [`clear`](Self::clear).
    pub fn set_access_token(&self, token: Option<String>) {
        match token {
            Some(token) => {
                let mut state = self.write_state();
                self.persist(&[(ACCESS_TOKEN_KEY, Some(&token))]);
                state.access_token = Some(token);
            }
            None => self.clear(),
        }
    }

    /// Stores the outcome of a refresh. The refresh token is only replaced
    /// when the backend rotated it.
    pub fn store_tokens(&self, access_token: String, refresh_token: Option<String>) {
        let mut state = self.write_state();
        match refresh_token {
            Some(refresh_token) => {
                self.persist(&[
                    (ACCESS_TOKEN_KEY, Some(&access_token)),
                    (REFRESH_TOKEN_KEY, Some(&refresh_token)),
                ]);
                state.refresh_token = Some(refresh_token);
            }
            None => self.persist(&[(ACCESS_TOKEN_KEY, Some(&access_token))]),
        }
        state.access_token = Some(access_token);
    }

    /// Starts a new session after login, replacing everything held before.
    pub fn establish(
        &self,
        access_token: String,
        refresh_token: Option<String>,
        user: Option<UserProfile>,
    ) {
        let mut state = self.write_state();
        let profile = user.as_ref().and_then(serialize_profile);
        let role = user
            .as_ref()
            .map(|user| user.role.as_str())
            .filter(|role| !role.is_empty());

        self.persist(&[
            (ACCESS_TOKEN_KEY, Some(&access_token)),
            (REFRESH_TOKEN_KEY, refresh_token.as_deref()),
            (USER_PROFILE_KEY, profile.as_deref()),
            (ROLE_KEY, role),
        ]);

        *state = SessionState {
            access_token: Some(access_token),
            refresh_token,
            user,
        };
    }

    /// Caches the profile of the signed-in user.
    pub fn set_user(&self, user: UserProfile) -> Result<(), SessionError> {
        let mut state = self.write_state();
        if state.access_token.is_none() {
            return Err(SessionError::NotAuthenticated);
        }

        let profile = serialize_profile(&user);
        let role = Some(user.role.as_str()).filter(|role| !role.is_empty());
        self.persist(&[(USER_PROFILE_KEY, profile.as_deref()), (ROLE_KEY, role)]);
        state.user = Some(user);
        Ok(())
    }

    /// Drops tokens and profile, in memory and in storage.
    pub fn clear(&self) {
        let mut state = self.write_state();
        let removals: Vec<(&str, Option<&str>)> = SESSION_KEYS.iter().map(|key| (*key, None)).collect();
        self.persist(&removals);
        *state = SessionState::default();
        debug!("Session cleared");
    }

    fn persist(&self, entries: &[(&str, Option<&str>)]) {
        if let Err(e) = self.storage.write(entries) {
            error!(
                storage = self.storage.name(),
                "Failed to persist session change: {}", e
            );
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.state.read().expect("session lock poisoned")
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().expect("session lock poisoned")
    }
}

fn serialize_profile(user: &UserProfile) -> Option<String> {
    match serde_json::to_string(user) {
        Ok(raw) => Some(raw),
        Err(e) => {
            error!("Failed to serialize user profile: {}", e);
            None
        }
    }
}
