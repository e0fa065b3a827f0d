use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tenancy_core::errors::{general_error_json, TenancyError};

#[derive(Debug)]
pub struct TenancyAxumError(pub anyhow::Error);

impl From<anyhow::Error> for TenancyAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<TenancyError> for TenancyAxumError {
    fn from(e: TenancyError) -> Self {
        Self(e.into_anyhow())
    }
}

impl IntoResponse for TenancyAxumError {
    fn into_response(self) -> Response {
        // Keep the Feathers-ish shape even when wrapped by anyhow contexts.
        if let Some(err) = TenancyError::from_anyhow(&self.0) {
            let status =
                StatusCode::from_u16(err.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (status, Json(err.to_json())).into_response();
        }

        tracing::error!(error = ?self.0, "unhandled error");
        // Top-level message only; the source chain stays in the logs.
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(general_error_json(self.0.to_string())),
        )
            .into_response()
    }
}

pub(crate) fn map_json_rejection(rejection: JsonRejection) -> TenancyAxumError {
    TenancyError::bad_request(
        "Failed to parse the request body as JSON",
        json!({"_schema": [rejection.body_text()]}),
    )
    .into()
}
