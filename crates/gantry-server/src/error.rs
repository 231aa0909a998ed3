//! HTTP mapping of provisioning errors

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

use gantry_common::Error;

/// A provisioning error on its way to the client
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

/// HTTP status for an error
pub fn status_of(error: &Error) -> StatusCode {
    match error {
        Error::Validation { .. } => StatusCode::BAD_REQUEST,
        Error::DuplicateTenant { .. } => StatusCode::CONFLICT,
        Error::InvalidCredentials => StatusCode::FORBIDDEN,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::ProvisionTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        Error::ExternalDependency { .. } => StatusCode::BAD_GATEWAY,
    }
}

/// Short machine-readable cause: the violated rule, the failing step, or
/// the status text
fn reason_of(error: &Error, status: StatusCode) -> String {
    match error {
        Error::Validation { rule, .. } => rule.clone(),
        Error::ExternalDependency {
            step: Some(step), ..
        } => step.clone(),
        _ => status
            .canonical_reason()
            .unwrap_or("error")
            .to_ascii_lowercase()
            .replace(' ', "_"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_of(&self.0);
        if status.is_server_error() {
            warn!(code = self.0.code(), error = %self.0, "request failed");
        }

        let mut body = json!({
            "success": false,
            "code": self.0.code(),
            "reason": reason_of(&self.0, status),
            "message": self.0.to_string(),
        });
        if let Error::Validation {
            field: Some(field), ..
        } = &self.0
        {
            body["field"] = json!(field);
        }

        (status, Json(body)).into_response()
    }
}
