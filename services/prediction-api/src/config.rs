use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use serde::Deserialize;
use pricecast_core::{load_layered, EnvSource};

const DEFAULTS: &[(&str, &str)] = &[
    ("api_bind_addr", "0.0.0.0:8000"),
    ("model_output_dir", "./models/trained"),
    ("model_name", "house_price_model"),
    ("preprocessor_name", "preprocessor"),
    ("request_timeout_ms", "5000"),
    ("acquire_on_start", "false"),
];

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSettings {
    #[serde(rename = "api_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(rename = "model_output_dir")]
    pub model_dir: PathBuf,
    pub model_name: String,
    pub preprocessor_name: String,
    pub request_timeout_ms: u64,
    /// Run the registry acquisition step before loading.
    pub acquire_on_start: bool,
}

impl ServiceSettings {
    pub fn load(env: &EnvSource) -> anyhow::Result<Self> { Ok(load_layered(DEFAULTS, env)?) }
    pub fn request_timeout(&self) -> Duration { Duration::from_millis(self.request_timeout_ms) }
}
