use std::collections::HashMap;
use std::sync::Mutex;

use super::{SessionStorage, StorageError};

/// Keeps the session for the lifetime of the process only.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .expect("memory storage mutex poisoned")
            .get(key)
            .cloned()
    }

    fn write(&self, entries: &[(&str, Option<&str>)]) -> Result<(), StorageError> {
        let mut map = self.entries.lock().expect("memory storage mutex poisoned");
        for (key, value) in entries {
            match value {
                Some(value) => {
                    map.insert(key.to_string(), value.to_string());
                }
                None => {
                    map.remove(*key);
                }
            }
        }
        Ok(())
    }
}
