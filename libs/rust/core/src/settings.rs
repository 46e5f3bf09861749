//! Layered configuration: built-in defaults, then an optional file named by
//! `PRICECAST_CONFIG_FILE`, then environment-style keys (case-insensitive).

use std::collections::HashMap;
use serde::de::DeserializeOwned;
use config::{Config, ConfigError, Environment, File};

pub const CONFIG_FILE_ENV: &str = "PRICECAST_CONFIG_FILE";

/// Where environment-style keys are read from.
#[derive(Debug, Clone, Default)]
pub enum EnvSource {
    #[default]
    Process,
    Fixed(HashMap<String, String>),
}

impl EnvSource {
    pub fn fixed<I, K, V>(pairs: I) -> Self
    where I: IntoIterator<Item = (K, V)>, K: Into<String>, V: Into<String> {
        Self::Fixed(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match self {
            Self::Process => std::env::var(key).ok(),
            Self::Fixed(vars) => vars.get(key).cloned(),
        }
    }

    fn environment(&self) -> Environment {
        let env = Environment::default();
        match self {
            Self::Process => env,
            Self::Fixed(vars) => env.source(Some(vars.clone().into_iter().collect())),
        }
    }
}

pub fn load_layered<T: DeserializeOwned>(defaults: &[(&str, &str)], env: &EnvSource) -> Result<T, ConfigError> {
    let mut builder = Config::builder();
    for (key, value) in defaults { builder = builder.set_default(*key, *value)?; }
    if let Some(file) = env.get(CONFIG_FILE_ENV).filter(|f| !f.is_empty()) {
        builder = builder.add_source(File::with_name(&file).required(false));
    }
    builder.add_source(env.environment()).build()?.try_deserialize()
}
