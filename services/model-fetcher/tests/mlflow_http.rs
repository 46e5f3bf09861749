//! MLflow REST client against an in-process stand-in for the tracking server.

use std::collections::HashMap;
use std::time::Duration;
use axum::{extract::{Path, Query}, http::StatusCode, routing::{get, post}, Json, Router};
use serde_json::{json, Value};
use model_fetcher::{acquire_with_mlflow, ArtifactOrigin, FetchSettings, MlflowRegistry, ModelRegistry, RegistryError};
use pricecast_core::EnvSource;

const MODEL: &[u8] = br#"{"name":"house_price_model","version":"3"}"#;

async fn latest(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let name = body["name"].as_str().unwrap_or_default();
    let stage = body["stages"][0].as_str().unwrap_or_default();
    match (name, stage) {
        ("broken", _) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error_code": "INTERNAL_ERROR"}))),
        ("house_price_model", "Production") => (StatusCode::OK, Json(json!({"model_versions": [
            {"name": "house_price_model", "version": "2", "current_stage": "Production", "run_id": "run2"},
            {"name": "house_price_model", "version": "3", "current_stage": "Production", "run_id": "run3", "source": "mlflow-artifacts:/1/run3/artifacts/model"}
        ]}))),
        ("house_price_model", _) => (StatusCode::OK, Json(json!({}))),
        _ => (StatusCode::NOT_FOUND, Json(json!({"error_code": "RESOURCE_DOES_NOT_EXIST", "message": format!("Registered Model with name={name} not found")}))),
    }
}

async fn download_uri(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    let version = q.get("version").cloned().unwrap_or_default();
    Json(json!({ "artifact_uri": format!("mlflow-artifacts:/1/run{version}/artifacts/model") }))
}

async fn artifact(Path(path): Path<String>) -> Result<Vec<u8>, StatusCode> {
    match path.as_str() {
        "1/run3/artifacts/model/house_price_model.json" => Ok(MODEL.to_vec()),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

async fn spawn_mlflow() -> String {
    let app = Router::new()
        .route("/api/2.0/mlflow/registered-models/get-latest-versions", post(latest))
        .route("/api/2.0/mlflow/model-versions/get-download-uri", get(download_uri))
        .route("/api/2.0/mlflow-artifacts/artifacts/*path", get(artifact));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap(); });
    format!("http://{addr}")
}

fn client(base: &str) -> MlflowRegistry { MlflowRegistry::new(base, Duration::from_secs(2)).unwrap() }

#[tokio::test]
async fn latest_version_picks_highest_in_stage() {
    let base = spawn_mlflow().await;
    let v = client(&base).latest_version("house_price_model", "Production").await.unwrap().expect("version");
    assert_eq!(v.version, "3");
    assert_eq!(v.run_id.as_deref(), Some("run3"));
}

#[tokio::test]
async fn empty_stage_and_unknown_model_are_none() {
    let base = spawn_mlflow().await;
    let registry = client(&base);
    assert!(registry.latest_version("house_price_model", "Staging").await.unwrap().is_none());
    assert!(registry.latest_version("no_such_model", "Staging").await.unwrap().is_none());
}

#[tokio::test]
async fn server_errors_surface_status() {
    let base = spawn_mlflow().await;
    match client(&base).latest_version("broken", "Staging").await {
        Err(RegistryError::Status { status, .. }) => assert_eq!(status, 500),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn fetch_artifact_downloads_and_reports_absent_files() {
    let base = spawn_mlflow().await;
    let registry = client(&base);
    let v = registry.latest_version("house_price_model", "Production").await.unwrap().unwrap();
    assert_eq!(registry.fetch_artifact(&v, "house_price_model.json").await.unwrap().as_deref(), Some(MODEL));
    assert!(registry.fetch_artifact(&v, "preprocessor.json").await.unwrap().is_none());
}

#[tokio::test]
async fn refused_connection_is_unreachable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let err = client(&format!("http://{addr}")).latest_version("house_price_model", "Staging").await.unwrap_err();
    assert!(matches!(err, RegistryError::Unreachable(_)), "got {err:?}");
}

#[tokio::test]
async fn acquire_end_to_end_through_fallback_stage() {
    let base = spawn_mlflow().await;
    let dir = tempfile::tempdir().unwrap();
    let settings = FetchSettings::load(&EnvSource::fixed([
        ("MLFLOW_TRACKING_URI".to_string(), base),
        ("MODEL_OUTPUT_DIR".to_string(), dir.path().display().to_string()),
        ("REGISTRY_RETRIES".to_string(), "0".to_string()),
    ])).unwrap();

    let artifact = acquire_with_mlflow(&settings).await.unwrap();
    assert_eq!(artifact.origin, ArtifactOrigin::Registry { version: "3".into(), stage: "Production".into() });
    assert_eq!(std::fs::read(&artifact.path).unwrap(), MODEL);
    assert!(artifact.companion.is_none());
}
