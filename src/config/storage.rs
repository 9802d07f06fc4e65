use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where the session survives between runs. We differentiate the backends
/// via a "type" tag in the YAML.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema, Default)]
#[serde(tag = "type")]
pub enum StorageConfig {
    /// Session lives only as long as the process.
    #[serde(rename = "memory")]
    #[default]
    Memory,
    /// Session is written through to a JSON file on every change.
    #[serde(rename = "file")]
    File(FileStorageConfig),
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct FileStorageConfig {
    pub path: PathBuf,
}
