//! HTTP Error Mapping
//!
//! Request-shape errors are the caller's fault (400); anything else maps
//! through the failure classifier so a retryable broker or database outage
//! reads as 503 and a configuration problem as 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use smartsearch_core::application::{classify, FailureClass};
use smartsearch_core::error::AppError;
use tracing::{error, warn};

#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AppError::Decode(_) | AppError::Validation(_) | AppError::Domain(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            other => match classify(other) {
                FailureClass::Transient => StatusCode::SERVICE_UNAVAILABLE,
                FailureClass::Permanent | FailureClass::ConfigFatal => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self.0, "Request rejected");
        }

        let message = match &self.0 {
            AppError::NotFound(_) => "Usuario no encontrado".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
