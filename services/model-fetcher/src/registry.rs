//! Seam between acquisition and whatever stores versioned model artifacts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::RegistryError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub current_stage: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
}

#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Latest version of `name` carrying `stage`, `None` when the stage is empty.
    async fn latest_version(&self, name: &str, stage: &str) -> Result<Option<ModelVersion>, RegistryError>;

    /// Raw bytes of `file` inside the version's artifact directory, `None` when absent.
    async fn fetch_artifact(&self, version: &ModelVersion, file: &str) -> Result<Option<Vec<u8>>, RegistryError>;
}
