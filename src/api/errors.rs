use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::error::FleetError;

#[derive(Debug)]
pub struct AppError(pub FleetError);

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            FleetError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            FleetError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            FleetError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            FleetError::EmptyFleet => (StatusCode::BAD_REQUEST, "EMPTY_FLEET"),
            FleetError::AlreadyRunning => (StatusCode::BAD_REQUEST, "ALREADY_RUNNING"),
            FleetError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let detail = match &self.0 {
            FleetError::Database(e) => {
                error!(error = %e, "Database error");
                "An internal error occurred".to_owned()
            }
            other => other.to_string(),
        };
        // `detail` is the key the dashboard reads error messages from.
        (status, Json(json!({ "detail": detail, "code": code }))).into_response()
    }
}

impl<E: Into<FleetError>> From<E> for AppError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}
