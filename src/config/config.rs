use std::path::Path;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use super::logging::LoggingConfig;
use super::storage::StorageConfig;

/// Prefix for environment overrides, e.g. `CAMPUS_BACKEND__BASE_URL`.
pub const ENV_PREFIX: &str = "CAMPUS_";

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0: the backend we talk to, the auth endpoints,
/// how the session is persisted and how an expired session is handled.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ConfigV1 {
    pub backend: BackendConfig,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub unauthorized: UnauthorizedConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Load config from a YAML file, then apply `CAMPUS_`-prefixed environment
/// overrides (`__` separates nested keys).
pub fn load_config(path: impl AsRef<Path>) -> Result<ConfigV1, String> {
    let figment = Figment::new()
        .merge(Yaml::file(path.as_ref()))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));
    extract_config(figment)
}

/// Extract a versioned config from an already assembled figment.
pub fn extract_config(figment: Figment) -> Result<ConfigV1, String> {
    let config = figment
        .extract::<Config>()
        .map_err(|e| format!("Error loading configuration: {}", e))?;

    // handle configuration migration between versions here when necessary
    match config {
        Config::ConfigV1(c) => Ok(c),
    }
}

/// Render the JSON schema for the configuration.
pub fn schema_json() -> Result<String, String> {
    let schema = schema_for!(Config);
    serde_json::to_string_pretty(&schema).map_err(|e| format!("Failed to render schema: {}", e))
}

/// The REST backend every request is sent to.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct BackendConfig {
    pub base_url: String,
    /// Client-side timeout applied to every request independently.
    #[serde(default = "default_timeout_in_ms")]
    pub timeout_in_ms: u64,
    /// The envelope `code` that means success. Every other code is an error.
    #[serde(default)]
    pub success_code: i64,
    pub user_agent: Option<String>,
}

fn default_timeout_in_ms() -> u64 {
    15_000
}

/// Paths of the session endpoints, relative to `backend.base_url`.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
#[serde(default)]
pub struct EndpointsConfig {
    pub login: String,
    pub refresh: String,
    pub logout: String,
    pub profile: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            refresh: "/auth/refresh".to_string(),
            logout: "/auth/logout".to_string(),
            profile: "/user/info".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
#[serde(default)]
pub struct RefreshConfig {
    /// When disabled, every 401 ends the session immediately.
    pub enabled: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// What happens to the user once the session cannot be recovered.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnauthorizedMode {
    /// Redirect to the login route straight away.
    #[default]
    Redirect,
    /// Show the expiry message and wait for the user before redirecting.
    Confirm,
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
#[serde(default)]
pub struct UnauthorizedConfig {
    pub mode: UnauthorizedMode,
    pub login_route: String,
    /// Query parameter carrying the path to return to after login.
    pub return_to_param: String,
    pub preserve_return_path: bool,
    pub message: String,
}

impl Default for UnauthorizedConfig {
    fn default() -> Self {
        Self {
            mode: UnauthorizedMode::Redirect,
            login_route: "/login".to_string(),
            return_to_param: "redirect".to_string(),
            preserve_return_path: true,
            message: "Your session has expired, please sign in again.".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
#[serde(default)]
pub struct NotificationConfig {
    /// Identical notices inside this window are shown once.
    pub throttle_in_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            throttle_in_ms: 3_000,
        }
    }
}
