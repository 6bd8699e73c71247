//! Mapping of record failures onto HTTP responses.

use api_shared::ErrorRes;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use fhir::FhirError;
use mdr_core::RecordError;

/// Error returned by every handler.
#[derive(Debug)]
pub enum ApiError {
    Record(RecordError),
    /// A stored record could not be rendered back to JSON.
    Render(FhirError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Record(RecordError::NotFound { .. } | RecordError::PatientNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Record(RecordError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RecordError> for ApiError {
    fn from(err: RecordError) -> Self {
        ApiError::Record(err)
    }
}

impl From<FhirError> for ApiError {
    fn from(err: FhirError) -> Self {
        ApiError::Render(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ApiError::Record(err) if status.is_client_error() => {
                tracing::warn!(error = %err, status = status.as_u16(), "request rejected");
                err.to_string()
            }
            ApiError::Record(_) | ApiError::Render(_) => {
                tracing::error!(error = ?self, "request failed");
                "Internal server error".to_string()
            }
        };

        (status, Json(ErrorRes::new(detail))).into_response()
    }
}
