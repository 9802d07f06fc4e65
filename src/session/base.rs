use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use super::{file_storage::FileStorage, memory_storage::MemoryStorage};
use crate::config::StorageConfig;

/// Keys the session occupies in storage. They are always cleared together.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_PROFILE_KEY: &str = "user_profile";
pub const ROLE_KEY: &str = "role";

pub const SESSION_KEYS: [&str; 4] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_PROFILE_KEY, ROLE_KEY];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("session storage is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

/// A durable key/value store the session is persisted into, so that a
/// restart picks the session back up.
///
/// `write` applies a batch of changes as one unit: `Some` sets a key,
/// `None` removes it.
pub trait SessionStorage: Send + Sync {
    fn name(&self) -> &str;
    fn get(&self, key: &str) -> Option<String>;
    fn write(&self, entries: &[(&str, Option<&str>)]) -> Result<(), StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.write(&[(key, Some(value))])
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.write(&[(key, None)])
    }
}

/// Creates a concrete storage implementation based on the StorageConfig.
pub fn create_storage(config: &StorageConfig) -> Result<Arc<dyn SessionStorage>, StorageError> {
    match config {
        StorageConfig::Memory => {
            info!("Session storage is in-memory; the session ends with the process.");
            Ok(Arc::new(MemoryStorage::new()))
        }
        StorageConfig::File(file_config) => {
            let storage = FileStorage::open(&file_config.path)?;
            info!(path = %file_config.path.display(), "Using file session storage.");
            Ok(Arc::new(storage))
        }
    }
}
