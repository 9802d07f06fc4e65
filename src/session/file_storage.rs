use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use super::{SessionStorage, StorageError};

/// Persists the session as a flat JSON object on disk. Every write rewrites
/// the whole file through a temporary file and a rename, so a crash leaves
/// either the old or the new session behind, never a mix.
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Opens the file at `path`. A missing file is an empty session; an
    /// unreadable one is discarded with a warning.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        let entries = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<BTreeMap<String, String>>(&bytes) {
                Ok(entries) => {
                    debug!(path = %path.display(), keys = entries.len(), "Loaded session file");
                    entries
                }
                Err(e) => {
                    warn!(path = %path.display(), "Ignoring corrupt session file: {}", e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let serialized = serde_json::to_vec_pretty(entries)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serialized)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStorage for FileStorage {
    fn name(&self) -> &str {
        "file"
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .expect("file storage mutex poisoned")
            .get(key)
            .cloned()
    }

    fn write(&self, entries: &[(&str, Option<&str>)]) -> Result<(), StorageError> {
        let mut map = self.entries.lock().expect("file storage mutex poisoned");
        let mut next = map.clone();
        for (key, value) in entries {
            match value {
                Some(value) => {
                    next.insert(key.to_string(), value.to_string());
                }
                None => {
                    next.remove(*key);
                }
            }
        }

        // Memory only moves forward once the file has.
        self.flush(&next)?;
        *map = next;
        Ok(())
    }
}
