//! Client construction.
//!
//! Builds the one session and the one client an application uses from the
//! loaded configuration.

use std::sync::Arc;

use tracing::info;

use crate::client::{AuthClient, ClientHooks, ReqwestTransport};
use crate::config::ConfigV1;
use crate::session::{create_storage, AuthSession};

/// Opens the configured session storage, restores whatever session it
/// holds and wires the client around it.
///
/// # Errors
///
/// Returns an error if the storage cannot be opened or the backend
/// settings are invalid.
pub fn build_client(config: &ConfigV1, hooks: ClientHooks) -> Result<AuthClient, String> {
    let storage = create_storage(&config.session.storage)
        .map_err(|e| format!("Failed to open session storage: {}", e))?;
    let session = Arc::new(AuthSession::restore(storage));
    let transport = Arc::new(ReqwestTransport::new(&config.backend).map_err(|e| e.to_string())?);

    info!(
        backend = %transport.base_url(),
        refresh_enabled = config.refresh.enabled,
        unauthorized_mode = ?config.unauthorized.mode,
        authenticated = session.is_authenticated(),
        "Client ready"
    );

    Ok(AuthClient::new(config, transport, session, hooks))
}
