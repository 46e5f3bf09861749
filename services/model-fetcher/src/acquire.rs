//! Artifact acquisition: registry first (primary stage, then fallback stage), local cache last.

use std::path::{Path, PathBuf};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use uuid::Uuid;
use pricecast_core::retry_async;
use crate::config::FetchSettings;
use crate::error::{AcquisitionError, RegistryError};
use crate::mlflow::MlflowRegistry;
use crate::registry::{ModelRegistry, ModelVersion};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactOrigin {
    /// Freshly materialized from the registry.
    Registry { version: String, stage: String },
    /// A previously cached copy; possibly stale.
    Cache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifact {
    pub path: PathBuf,
    pub companion: Option<PathBuf>,
    pub origin: ArtifactOrigin,
}

impl LocalArtifact {
    pub fn exists(&self) -> bool { self.path.is_file() }
    pub fn is_fresh(&self) -> bool { matches!(self.origin, ArtifactOrigin::Registry { .. }) }
}

/// Guarantees a usable model file at `settings.model_path()` or returns `NotAvailable`.
pub async fn acquire<R: ModelRegistry + ?Sized>(registry: &R, settings: &FetchSettings) -> Result<LocalArtifact, AcquisitionError> {
    let reference = settings.reference();
    info!(registry=%reference.registry_uri, name=%reference.name, stage=%reference.stage, "acquiring model artifact");
    match from_registry(registry, settings).await {
        Ok(artifact) => Ok(artifact),
        Err(cause) => fall_back(settings, cause),
    }
}

/// `acquire` against the MLflow registry named in `settings`.
pub async fn acquire_with_mlflow(settings: &FetchSettings) -> Result<LocalArtifact, AcquisitionError> {
    match MlflowRegistry::new(&settings.tracking_uri, settings.registry_timeout()) {
        Ok(registry) => acquire(&registry, settings).await,
        Err(e) => fall_back(settings, e.into()),
    }
}

fn fall_back(settings: &FetchSettings, cause: AcquisitionError) -> Result<LocalArtifact, AcquisitionError> {
    warn!(error=%cause, "registry acquisition failed; checking local cache");
    let path = settings.model_path();
    if !path.is_file() {
        error!(path=%path.display(), "no local model artifact");
        return Err(AcquisitionError::NotAvailable { path, cause: Box::new(cause) });
    }
    let companion = Some(settings.companion_path()).filter(|p| p.is_file());
    info!(path=%path.display(), companion=companion.is_some(), "using cached model artifact");
    Ok(LocalArtifact { path, companion, origin: ArtifactOrigin::Cache })
}

async fn from_registry<R: ModelRegistry + ?Sized>(registry: &R, settings: &FetchSettings) -> Result<LocalArtifact, AcquisitionError> {
    let (version, stage) = resolve_version(registry, settings).await?;
    info!(version=%version.version, %stage, "found model version");

    let model_file = settings.model_file();
    let model = fetch(registry, settings, &version, &model_file).await?
        .ok_or_else(|| AcquisitionError::Corrupt { file: model_file.clone(), reason: format!("absent from version {} artifacts", version.version) })?;
    verify(&model_file, &model, settings.expected_digest())?;

    let companion_file = settings.companion_file();
    let companion = fetch(registry, settings, &version, &companion_file).await?;
    if let Some(bytes) = &companion { verify(&companion_file, bytes, None)?; }

    tokio::fs::create_dir_all(&settings.output_dir).await?;
    let path = settings.model_path();
    let companion_path = settings.companion_path();
    let model_tmp = stage_file(&path, &model).await?;
    let companion_tmp = match &companion {
        Some(bytes) => match stage_file(&companion_path, bytes).await {
            Ok(tmp) => Some(tmp),
            Err(e) => {
                discard(&model_tmp).await;
                return Err(e);
            }
        },
        None => None,
    };
    if companion.is_none() && is_regular_file(&companion_path).await {
        // a leftover transform from another version would no longer match the model
        warn!(path=%companion_path.display(), "version ships no preprocessor; retiring stale copy");
    }
    commit(&path, &model_tmp, &companion_path, companion_tmp.as_deref()).await?;
    info!(path=%path.display(), bytes=model.len(), companion=companion.is_some(), "saved model");

    let companion = companion.map(|_| companion_path);
    Ok(LocalArtifact { path, companion, origin: ArtifactOrigin::Registry { version: version.version, stage } })
}

async fn resolve_version<R: ModelRegistry + ?Sized>(registry: &R, settings: &FetchSettings) -> Result<(ModelVersion, String), AcquisitionError> {
    let retry = settings.retry();
    let name = settings.model_name.as_str();
    let stages = settings.stages();
    for stage in &stages {
        let stage = *stage;
        info!(name, stage, "looking up latest version");
        match retry_async(&retry, RegistryError::is_transient, |_| async move { registry.latest_version(name, stage).await }).await? {
            Some(version) => return Ok((version, stage.to_string())),
            None => warn!(name, stage, "no model version in stage"),
        }
    }
    Err(AcquisitionError::NotFound { name: name.to_string(), stages: stages.iter().map(|s| s.to_string()).collect() })
}

async fn fetch<R: ModelRegistry + ?Sized>(registry: &R, settings: &FetchSettings, version: &ModelVersion, file: &str) -> Result<Option<Vec<u8>>, AcquisitionError> {
    Ok(retry_async(&settings.retry(), RegistryError::is_transient, |_| async move { registry.fetch_artifact(version, file).await }).await?)
}

fn verify(file: &str, bytes: &[u8], expected_sha256: Option<&str>) -> Result<(), AcquisitionError> {
    serde_json::from_slice::<serde_json::Value>(bytes)
        .map_err(|e| AcquisitionError::Corrupt { file: file.to_string(), reason: format!("not valid JSON: {e}") })?;
    if let Some(expected) = expected_sha256 {
        let got = hex::encode(Sha256::digest(bytes));
        if !got.eq_ignore_ascii_case(expected) {
            return Err(AcquisitionError::Corrupt { file: file.to_string(), reason: format!("sha256 mismatch expected={expected} got={got}") });
        }
    }
    Ok(())
}

fn hidden_sibling(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!(".{file_name}.{}.{suffix}", Uuid::new_v4().simple()))
}

async fn is_regular_file(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound { warn!(path=%path.display(), error=%e, "cannot remove staged file"); }
    }
}

/// Writes `bytes` next to `path` under a hidden name and syncs it; nothing visible changes yet.
async fn stage_file(path: &Path, bytes: &[u8]) -> Result<PathBuf, AcquisitionError> {
    let tmp = hidden_sibling(path, "partial");
    let written = async {
        let mut f = tokio::fs::File::create(&tmp).await?;
        f.write_all(bytes).await?;
        f.sync_all().await
    }.await;
    if let Err(e) = written {
        discard(&tmp).await;
        return Err(e.into());
    }
    Ok(tmp)
}

/// Installs a staged model and its companion as one pair; the model is renamed last.
/// Without a staged companion any cached one is retired, since it belongs to another version.
/// On failure the staged files are dropped and the previous pair is restored.
async fn commit(model_path: &Path, model_tmp: &Path, companion_path: &Path, companion_tmp: Option<&Path>) -> Result<(), AcquisitionError> {
    let previous = if is_regular_file(companion_path).await {
        let aside = hidden_sibling(companion_path, "previous");
        if let Err(e) = tokio::fs::rename(companion_path, &aside).await {
            rollback(model_tmp, companion_tmp, false, companion_path, None).await;
            return Err(e.into());
        }
        Some(aside)
    } else {
        None
    };

    if let Some(tmp) = companion_tmp {
        if let Err(e) = tokio::fs::rename(tmp, companion_path).await {
            rollback(model_tmp, companion_tmp, false, companion_path, previous.as_deref()).await;
            return Err(e.into());
        }
    }
    if let Err(e) = tokio::fs::rename(model_tmp, model_path).await {
        rollback(model_tmp, companion_tmp, companion_tmp.is_some(), companion_path, previous.as_deref()).await;
        return Err(e.into());
    }
    if let Some(aside) = previous { discard(&aside).await; }
    Ok(())
}

async fn rollback(model_tmp: &Path, companion_tmp: Option<&Path>, companion_installed: bool, companion_path: &Path, previous: Option<&Path>) {
    discard(model_tmp).await;
    if let Some(tmp) = companion_tmp { discard(tmp).await; }
    if companion_installed { discard(companion_path).await; }
    if let Some(aside) = previous {
        if let Err(e) = tokio::fs::rename(aside, companion_path).await {
            error!(path=%companion_path.display(), error=%e, "cannot restore previous preprocessor");
        }
    }
}
