//! API error type and its HTTP mapping

use crate::geo::GeoError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use speedlog_core::{RunError, StoreError};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Geo(#[from] GeoError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Run(RunError::ServerNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Run(RunError::NoServerAvailable) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Run(RunError::Provider { .. } | RunError::MeasurementFailed { .. }) => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::Run(RunError::Store(_)) | ApiError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Geo(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!("Request failed ({}): {}", status, self);
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
