//! Model artifact acquisition: pull the newest staged model from the registry, or fall back
//! to the copy already cached on disk.

pub mod acquire;
pub mod config;
pub mod error;
pub mod mlflow;
pub mod registry;

pub use acquire::{acquire, acquire_with_mlflow, ArtifactOrigin, LocalArtifact};
pub use config::{ArtifactReference, FetchSettings};
pub use error::{AcquisitionError, RegistryError};
pub use mlflow::MlflowRegistry;
pub use registry::{ModelRegistry, ModelVersion};
