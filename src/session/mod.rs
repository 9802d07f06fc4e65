pub mod auth_session;
pub mod base;
pub mod file_storage;
pub mod memory_storage;

// Re-export the primary session items so code outside can do
// "use crate::session::{AuthSession, SessionStorage, create_storage};"
pub use auth_session::{AuthSession, SessionError, SessionState};
pub use base::{create_storage, SessionStorage, StorageError};
pub use file_storage::FileStorage;
pub use memory_storage::MemoryStorage;
