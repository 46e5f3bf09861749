use std::time::Duration;
use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};
use crate::model::InferenceError;

/// Per-request failures; none of them outlive the request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("model not loaded")]
    NotReady,
    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("inference exceeded {0:?}")]
    Timeout(Duration),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            Self::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Inference(_) | Self::Timeout(_) => error!(error=%self, "prediction failed"),
            _ => debug!(error=%self, status=status.as_u16(), "request rejected"),
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
