//! Fallback chain: primary stage -> fallback stage -> local cache -> NotAvailable.

use std::collections::HashMap;
use std::path::Path;
use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use model_fetcher::{acquire, AcquisitionError, ArtifactOrigin, FetchSettings, ModelRegistry, ModelVersion, RegistryError};
use pricecast_core::EnvSource;

const MODEL_V7: &[u8] = br#"{"name":"house_price_model","version":"7"}"#;
const MODEL_V4: &[u8] = br#"{"name":"house_price_model","version":"4"}"#;
const SCALER: &[u8] = br#"{"features":[],"mean":[],"scale":[]}"#;

#[derive(Default)]
struct FakeRegistry {
    versions: HashMap<String, ModelVersion>,
    files: HashMap<(String, String), Vec<u8>>,
    failure: Option<fn() -> RegistryError>,
    calls: Mutex<Vec<String>>,
}

impl FakeRegistry {
    fn failing(failure: fn() -> RegistryError) -> Self { Self { failure: Some(failure), ..Self::default() } }
    fn unreachable() -> Self { Self::failing(|| RegistryError::Unreachable("connection refused".into())) }

    fn with_version(mut self, stage: &str, version: &str, files: &[(&str, &[u8])]) -> Self {
        self.versions.insert(stage.to_string(), ModelVersion {
            name: "house_price_model".into(),
            version: version.into(),
            current_stage: stage.into(),
            source: None,
            run_id: None,
        });
        for (file, bytes) in files { self.files.insert((version.to_string(), file.to_string()), bytes.to_vec()); }
        self
    }

    fn calls(&self) -> Vec<String> { self.calls.lock().clone() }
}

#[async_trait]
impl ModelRegistry for FakeRegistry {
    async fn latest_version(&self, _name: &str, stage: &str) -> Result<Option<ModelVersion>, RegistryError> {
        self.calls.lock().push(format!("latest:{stage}"));
        if let Some(failure) = self.failure { return Err(failure()); }
        Ok(self.versions.get(stage).cloned())
    }

    async fn fetch_artifact(&self, version: &ModelVersion, file: &str) -> Result<Option<Vec<u8>>, RegistryError> {
        self.calls.lock().push(format!("fetch:{}:{file}", version.version));
        Ok(self.files.get(&(version.version.clone(), file.to_string())).cloned())
    }
}

fn scratch() -> TempDir { tempfile::tempdir().unwrap() }

fn settings(dir: &Path, extra: &[(&str, &str)]) -> FetchSettings {
    let mut vars = vec![("MODEL_OUTPUT_DIR".to_string(), dir.display().to_string()), ("REGISTRY_RETRIES".to_string(), "0".to_string())];
    vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    FetchSettings::load(&EnvSource::fixed(vars)).unwrap()
}

fn seed_cache(s: &FetchSettings, bytes: &[u8]) {
    std::fs::create_dir_all(&s.output_dir).unwrap();
    std::fs::write(s.model_path(), bytes).unwrap();
}

#[tokio::test]
async fn primary_stage_materializes_model_and_companion() {
    let dir = scratch();
    let s = settings(dir.path(), &[]);
    let registry = FakeRegistry::default().with_version("Staging", "7", &[("house_price_model.json", MODEL_V7), ("preprocessor.json", SCALER)]);

    let artifact = acquire(&registry, &s).await.unwrap();
    assert_eq!(artifact.path, s.model_path());
    assert_eq!(artifact.companion, Some(s.companion_path()));
    assert_eq!(artifact.origin, ArtifactOrigin::Registry { version: "7".into(), stage: "Staging".into() });
    assert!(artifact.exists());
    assert_eq!(std::fs::read(&artifact.path).unwrap(), MODEL_V7);
    assert_eq!(registry.calls()[0], "latest:Staging");
    assert!(!registry.calls().contains(&"latest:Production".to_string()));

    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().filter_map(|e| e.ok()).map(|e| e.file_name().to_string_lossy().into_owned()).filter(|n| n.ends_with(".partial")).collect();
    assert!(leftovers.is_empty(), "temporary files left behind: {leftovers:?}");
}

#[tokio::test]
async fn falls_back_to_secondary_stage_and_downloads_that_version() {
    let dir = scratch();
    let s = settings(dir.path(), &[]);
    let registry = FakeRegistry::default().with_version("Production", "4", &[("house_price_model.json", MODEL_V4)]);

    let artifact = acquire(&registry, &s).await.unwrap();
    assert_eq!(artifact.origin, ArtifactOrigin::Registry { version: "4".into(), stage: "Production".into() });
    assert_eq!(artifact.companion, None);
    assert_eq!(std::fs::read(&artifact.path).unwrap(), MODEL_V4);
    let calls = registry.calls();
    assert_eq!(&calls[..3], &["latest:Staging", "latest:Production", "fetch:4:house_price_model.json"]);
}

#[tokio::test]
async fn cached_copy_is_returned_unchanged_when_no_stage_has_a_version() {
    let dir = scratch();
    let s = settings(dir.path(), &[]);
    seed_cache(&s, MODEL_V4);
    let registry = FakeRegistry::default();

    let artifact = acquire(&registry, &s).await.unwrap();
    assert_eq!(artifact.origin, ArtifactOrigin::Cache);
    assert_eq!(artifact.path, s.model_path());
    assert!(!artifact.is_fresh());
    assert_eq!(std::fs::read(&artifact.path).unwrap(), MODEL_V4);
    assert_eq!(registry.calls(), vec!["latest:Staging", "latest:Production"]);
}

#[tokio::test]
async fn unreachable_registry_uses_cache_without_trying_more_stages() {
    let dir = scratch();
    let s = settings(dir.path(), &[]);
    seed_cache(&s, MODEL_V4);
    let registry = FakeRegistry::unreachable();

    let artifact = acquire(&registry, &s).await.unwrap();
    assert_eq!(artifact.origin, ArtifactOrigin::Cache);
    assert_eq!(registry.calls(), vec!["latest:Staging"]);
}

#[tokio::test]
async fn nothing_anywhere_is_fatal() {
    let dir = scratch();
    let s = settings(dir.path(), &[]);
    let err = acquire(&FakeRegistry::unreachable(), &s).await.unwrap_err();
    assert!(err.is_fatal());
    match err {
        AcquisitionError::NotAvailable { path, cause } => {
            assert_eq!(path, s.model_path());
            assert!(matches!(*cause, AcquisitionError::RegistryUnavailable(RegistryError::Unreachable(_))));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn not_found_without_cache_reports_attempted_stages() {
    let dir = scratch();
    let s = settings(dir.path(), &[]);
    match acquire(&FakeRegistry::default(), &s).await.unwrap_err() {
        AcquisitionError::NotAvailable { cause, .. } => match *cause {
            AcquisitionError::NotFound { stages, .. } => assert_eq!(stages, vec!["Staging", "Production"]),
            other => panic!("unexpected cause: {other}"),
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn digest_mismatch_keeps_the_cached_copy() {
    let dir = scratch();
    let s = settings(dir.path(), &[("MODEL_SHA256", "deadbeef")]);
    seed_cache(&s, MODEL_V4);
    let registry = FakeRegistry::default().with_version("Staging", "7", &[("house_price_model.json", MODEL_V7)]);

    let artifact = acquire(&registry, &s).await.unwrap();
    assert_eq!(artifact.origin, ArtifactOrigin::Cache);
    assert_eq!(std::fs::read(&artifact.path).unwrap(), MODEL_V4);
}

#[tokio::test]
async fn new_version_overwrites_cache_and_drops_stale_companion() {
    let dir = scratch();
    let s = settings(dir.path(), &[]);
    seed_cache(&s, MODEL_V4);
    std::fs::write(s.companion_path(), SCALER).unwrap();
    let registry = FakeRegistry::default().with_version("Staging", "7", &[("house_price_model.json", MODEL_V7)]);

    let artifact = acquire(&registry, &s).await.unwrap();
    assert!(artifact.is_fresh());
    assert_eq!(std::fs::read(&artifact.path).unwrap(), MODEL_V7);
    assert_eq!(artifact.companion, None);
    assert!(!s.companion_path().exists());
}

#[tokio::test]
async fn version_without_model_file_falls_back() {
    let dir = scratch();
    let s = settings(dir.path(), &[]);
    let registry = FakeRegistry::default().with_version("Staging", "7", &[("preprocessor.json", SCALER)]);
    let err = acquire(&registry, &s).await.unwrap_err();
    match err {
        AcquisitionError::NotAvailable { cause, .. } => assert!(matches!(*cause, AcquisitionError::Corrupt { .. })),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unwritable_companion_slot_leaves_cached_pair_untouched() {
    let dir = scratch();
    let s = settings(dir.path(), &[]);
    seed_cache(&s, MODEL_V4);
    // a directory where the preprocessor belongs makes the final rename fail
    std::fs::create_dir(s.companion_path()).unwrap();
    let registry = FakeRegistry::default().with_version("Staging", "7", &[("house_price_model.json", MODEL_V7), ("preprocessor.json", SCALER)]);

    let artifact = acquire(&registry, &s).await.unwrap();
    assert_eq!(artifact.origin, ArtifactOrigin::Cache);
    assert_eq!(std::fs::read(&artifact.path).unwrap(), MODEL_V4);
    assert_eq!(artifact.companion, None);
    let hidden: Vec<_> = std::fs::read_dir(dir.path()).unwrap().filter_map(|e| e.ok()).map(|e| e.file_name().to_string_lossy().into_owned()).filter(|n| n.starts_with('.')).collect();
    assert!(hidden.is_empty(), "staged files left behind: {hidden:?}");
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let dir = scratch();
    let s = settings(dir.path(), &[("REGISTRY_RETRIES", "3")]);
    seed_cache(&s, MODEL_V4);
    let registry = FakeRegistry::failing(|| RegistryError::Status { status: 403, body: "forbidden".into() });

    let artifact = acquire(&registry, &s).await.unwrap();
    assert_eq!(artifact.origin, ArtifactOrigin::Cache);
    assert_eq!(registry.calls(), vec!["latest:Staging"]);
}
