//! HTTP surface: health, readiness, predict, batch-predict, metrics.

use std::time::{Duration, Instant};
use axum::{
    async_trait,
    extract::{FromRequest, MatchedPath, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::instrument;
use pricecast_core::encode_metrics;
use crate::error::ApiError;
use crate::metrics::Endpoint;
use crate::model::InferenceError;
use crate::schema::{HealthResponse, HouseFeatures, PredictionResponse, Validate};
use crate::state::SharedState;
use crate::SERVICE_NAME;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/predict", post(predict))
        .route("/batch-predict", post(batch_predict))
        .route("/metrics", get(metrics))
        .route_layer(middleware::from_fn_with_state(state.clone(), track_http))
        // browser clients on any origin may call the API
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// JSON body that decoded and passed `Validate`; anything else is a 422.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
        value.validate().map_err(ApiError::Validation)?;
        Ok(Self(value))
    }
}

async fn service_info(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.model().map(|m| m.summary()),
    }))
}

async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let loaded = state.model().is_some();
    Json(HealthResponse { status: if loaded { "healthy" } else { "unhealthy" }.to_string(), model_loaded: loaded })
}

async fn ready(State(state): State<SharedState>) -> (StatusCode, Json<Value>) {
    let ready = state.is_ready();
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(json!({ "ready": ready, "phase": state.phase() })))
}

#[instrument(skip_all)]
async fn predict(State(state): State<SharedState>, ValidatedJson(house): ValidatedJson<HouseFeatures>) -> Result<Json<PredictionResponse>, ApiError> {
    let model = state.model().ok_or(ApiError::NotReady)?;
    state.metrics.record_request(Endpoint::Predict);
    let started = Instant::now();
    let outcome = run_inference(state.request_timeout(), move || model.predict(&house)).await;
    state.metrics.observe_latency(Endpoint::Predict, started.elapsed());
    let estimate = outcome?;
    Ok(Json(PredictionResponse::from_estimate(&estimate, Utc::now())))
}

#[instrument(skip_all)]
async fn batch_predict(State(state): State<SharedState>, ValidatedJson(batch): ValidatedJson<Vec<HouseFeatures>>) -> Result<Json<Vec<PredictionResponse>>, ApiError> {
    // an empty batch never needs the model
    let model = if batch.is_empty() { None } else { Some(state.model().ok_or(ApiError::NotReady)?) };
    state.metrics.record_request(Endpoint::BatchPredict);
    let started = Instant::now();
    let outcome = match model {
        None => Ok(Vec::new()),
        Some(model) => run_inference(state.request_timeout(), move || {
            batch.iter().map(|house| model.predict(house)).collect::<Result<Vec<_>, _>>()
        }).await,
    };
    state.metrics.observe_latency(Endpoint::BatchPredict, started.elapsed());
    let now = Utc::now();
    Ok(Json(outcome?.iter().map(|e| PredictionResponse::from_estimate(e, now)).collect()))
}

async fn metrics(State(state): State<SharedState>) -> Response {
    encode_metrics(state.metrics.registry())
}

/// Runs `job` on the blocking pool under `limit`. Panics become `InferenceError::Panicked`;
/// a job that overruns keeps its thread until it finishes but the caller is answered at once.
pub async fn run_inference<T, F>(limit: Duration, job: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, InferenceError> + Send + 'static,
{
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(job)).await {
        Err(_) => Err(ApiError::Timeout(limit)),
        Ok(Err(join)) => Err(ApiError::Inference(InferenceError::Panicked(join.to_string()))),
        Ok(Ok(result)) => result.map_err(ApiError::Inference),
    }
}

async fn track_http(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let handler = req.extensions().get::<MatchedPath>().map(|p| p.as_str().to_owned()).unwrap_or_else(|| "unmatched".into());
    let started = Instant::now();
    let resp = next.run(req).await;
    state.metrics.record_http(&method, &handler, resp.status().as_u16(), started.elapsed());
    resp
}
