use std::path::PathBuf;
use thiserror::Error;

/// Transport-level failures talking to a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry unreachable: {0}")] Unreachable(String),
    #[error("registry answered {status}: {body}")] Status { status: u16, body: String },
    #[error("unexpected registry payload: {0}")] Decode(String),
}

impl RegistryError {
    /// Worth another attempt: the registry could not be reached or failed on its side.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() { Self::Decode(e.to_string()) } else { Self::Unreachable(e.to_string()) }
    }
}

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("registry unavailable: {0}")]
    RegistryUnavailable(#[from] RegistryError),
    #[error("no version of '{name}' under stages {stages:?}")]
    NotFound { name: String, stages: Vec<String> },
    #[error("artifact '{file}' is unusable: {reason}")]
    Corrupt { file: String, reason: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no artifact available at {path:?} (registry path failed: {cause})")]
    NotAvailable { path: PathBuf, cause: Box<AcquisitionError> },
}

impl AcquisitionError {
    /// Everything short of `NotAvailable` is answered by the local cache.
    pub fn is_fatal(&self) -> bool { matches!(self, Self::NotAvailable { .. }) }
}
