//! MLflow model registry client over its REST API (2.0 endpoints).

use std::time::Duration;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use crate::error::RegistryError;
use crate::registry::{ModelRegistry, ModelVersion};

#[derive(Debug, Deserialize)]
struct LatestVersions {
    #[serde(default)]
    model_versions: Vec<ModelVersion>,
}

#[derive(Debug, Deserialize)]
struct DownloadUri { artifact_uri: String }

#[derive(Debug, Clone)]
pub struct MlflowRegistry {
    client: reqwest::Client,
    base: String,
}

impl MlflowRegistry {
    pub fn new(tracking_uri: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Unreachable(e.to_string()))?;
        Ok(Self { client, base: tracking_uri.trim_end_matches('/').to_string() })
    }

    fn api(&self, path: &str) -> String { format!("{}/api/2.0/{}", self.base, path) }

    async fn download_uri(&self, version: &ModelVersion) -> Result<String, RegistryError> {
        let resp = self.client
            .get(self.api("mlflow/model-versions/get-download-uri"))
            .query(&[("name", version.name.as_str()), ("version", version.version.as_str())])
            .send()
            .await?;
        let payload: DownloadUri = check(resp).await?.json().await?;
        Ok(payload.artifact_uri)
    }

    /// Maps an artifact URI reported by the registry onto a fetchable URL for `file`.
    pub fn artifact_url(&self, artifact_uri: &str, file: &str) -> Result<String, RegistryError> {
        if let Some(rest) = artifact_uri.strip_prefix("mlflow-artifacts:") {
            // mlflow-artifacts://host:port/path carries an authority we replace with our own base
            let path = match rest.strip_prefix("//") {
                Some(with_authority) => with_authority.split_once('/').map(|(_, p)| p).unwrap_or(""),
                None => rest.trim_start_matches('/'),
            };
            let path = path.trim_end_matches('/');
            if path.is_empty() { return Ok(format!("{}/api/2.0/mlflow-artifacts/artifacts/{}", self.base, file)); }
            return Ok(format!("{}/api/2.0/mlflow-artifacts/artifacts/{}/{}", self.base, path, file));
        }
        if artifact_uri.starts_with("http://") || artifact_uri.starts_with("https://") {
            return Ok(format!("{}/{}", artifact_uri.trim_end_matches('/'), file));
        }
        Err(RegistryError::Decode(format!("unsupported artifact uri scheme: {artifact_uri}")))
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, RegistryError> {
    let status = resp.status();
    if status.is_success() { return Ok(resp); }
    let body = resp.text().await.unwrap_or_default();
    Err(RegistryError::Status { status: status.as_u16(), body })
}

#[async_trait]
impl ModelRegistry for MlflowRegistry {
    async fn latest_version(&self, name: &str, stage: &str) -> Result<Option<ModelVersion>, RegistryError> {
        debug!(name, stage, base=%self.base, "querying latest versions");
        let resp = self.client
            .post(self.api("mlflow/registered-models/get-latest-versions"))
            .json(&json!({ "name": name, "stages": [stage] }))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            let body = resp.text().await.unwrap_or_default();
            if body.contains("RESOURCE_DOES_NOT_EXIST") { return Ok(None); }
            return Err(RegistryError::Status { status: 404, body });
        }
        let payload: LatestVersions = check(resp).await?.json().await?;
        Ok(payload.model_versions.into_iter().max_by_key(|v| v.version.parse::<u64>().unwrap_or(0)))
    }

    async fn fetch_artifact(&self, version: &ModelVersion, file: &str) -> Result<Option<Vec<u8>>, RegistryError> {
        let uri = self.download_uri(version).await?;
        let url = self.artifact_url(&uri, file)?;
        debug!(%url, "downloading artifact");
        let resp = self.client.get(&url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND { return Ok(None); }
        let bytes = check(resp).await?.bytes().await?;
        Ok(Some(bytes.to_vec()))
    }
}
