use std::path::PathBuf;
use std::time::Duration;
use serde::Deserialize;
use pricecast_core::{load_layered, EnvSource, RetryConfig};

pub const DEFAULT_TRACKING_URI: &str = "http://localhost:5555";
pub const DEFAULT_MODEL_NAME: &str = "house_price_model";
pub const DEFAULT_STAGE: &str = "Staging";
pub const DEFAULT_FALLBACK_STAGE: &str = "Production";
pub const DEFAULT_OUTPUT_DIR: &str = "./models/trained";
pub const DEFAULT_PREPROCESSOR_NAME: &str = "preprocessor";

const DEFAULTS: &[(&str, &str)] = &[
    ("mlflow_tracking_uri", DEFAULT_TRACKING_URI),
    ("model_name", DEFAULT_MODEL_NAME),
    ("model_stage", DEFAULT_STAGE),
    ("model_fallback_stage", DEFAULT_FALLBACK_STAGE),
    ("model_output_dir", DEFAULT_OUTPUT_DIR),
    ("preprocessor_name", DEFAULT_PREPROCESSOR_NAME),
    ("model_sha256", ""),
    ("registry_timeout_secs", "10"),
    ("registry_retries", "2"),
];

/// What to fetch: immutable once built from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReference {
    pub name: String,
    pub stage: String,
    pub registry_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchSettings {
    #[serde(rename = "mlflow_tracking_uri")]
    pub tracking_uri: String,
    pub model_name: String,
    #[serde(rename = "model_stage")]
    pub stage: String,
    #[serde(rename = "model_fallback_stage")]
    pub fallback_stage: String,
    #[serde(rename = "model_output_dir")]
    pub output_dir: PathBuf,
    pub preprocessor_name: String,
    #[serde(rename = "model_sha256")]
    pub expected_sha256: String,
    pub registry_timeout_secs: u64,
    pub registry_retries: usize,
}

impl FetchSettings {
    pub fn from_env() -> anyhow::Result<Self> { Self::load(&EnvSource::Process) }

    pub fn load(env: &EnvSource) -> anyhow::Result<Self> { Ok(load_layered(DEFAULTS, env)?) }

    pub fn reference(&self) -> ArtifactReference {
        ArtifactReference { name: self.model_name.clone(), stage: self.stage.clone(), registry_uri: self.tracking_uri.clone() }
    }

    /// Stage labels to try, in order, without repeating one.
    pub fn stages(&self) -> Vec<&str> {
        let mut out = vec![self.stage.as_str()];
        if !self.fallback_stage.is_empty() && !self.fallback_stage.eq_ignore_ascii_case(&self.stage) { out.push(self.fallback_stage.as_str()); }
        out
    }

    pub fn model_file(&self) -> String { format!("{}.json", self.model_name) }
    pub fn companion_file(&self) -> String { format!("{}.json", self.preprocessor_name) }
    pub fn model_path(&self) -> PathBuf { self.output_dir.join(self.model_file()) }
    pub fn companion_path(&self) -> PathBuf { self.output_dir.join(self.companion_file()) }
    pub fn registry_timeout(&self) -> Duration { Duration::from_secs(self.registry_timeout_secs) }
    pub fn retry(&self) -> RetryConfig { RetryConfig { max_retries: self.registry_retries, ..RetryConfig::default() } }
    pub fn expected_digest(&self) -> Option<&str> { Some(self.expected_sha256.trim()).filter(|d| !d.is_empty()) }
}
