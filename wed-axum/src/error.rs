use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use wed_core::WedError;

#[derive(Debug)]
pub struct WedAxumError(pub anyhow::Error);

impl From<anyhow::Error> for WedAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<WedError> for WedAxumError {
    fn from(e: WedError) -> Self {
        Self(e.into_anyhow())
    }
}

impl IntoResponse for WedAxumError {
    fn into_response(self) -> Response {
        // Keep Feathers-ish fields even when the WedError sits under anyhow contexts
        let safe = match WedError::from_anyhow(&self.0) {
            Some(wed) => wed.sanitize_for_client(),
            None => WedError::general_error(self.0.to_string()),
        };

        if safe.code() >= 500 {
            tracing::error!(error = ?self.0, code = safe.code(), "request failed");
        } else {
            tracing::debug!(error = %self.0, code = safe.code(), "request rejected");
        }

        let status = StatusCode::from_u16(safe.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(safe.to_json())).into_response()
    }
}

pub fn json_rejection(rejection: JsonRejection) -> WedAxumError {
    WedError::bad_request("Failed to parse the request body as JSON")
        .with_errors(json!({"_schema": [rejection.body_text()]}))
        .into()
}
