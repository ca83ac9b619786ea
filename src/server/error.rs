//! Error-to-HTTP response conversion.
//!
//! Handlers return `Result<T, AppError>`; [`picserve_common::Error`] converts
//! into it with `?`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: picserve_common::Error,
}

impl AppError {
    pub fn new(inner: picserve_common::Error) -> Self {
        Self { inner }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.inner.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<picserve_common::Error> for AppError {
    fn from(e: picserve_common::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let code = match &self.inner {
            picserve_common::Error::NotFound { .. } => "not_found",
            picserve_common::Error::NotAllowed { .. } => "not_allowed",
            picserve_common::Error::Internal { .. } => "internal_error",
        };

        let message = if self.inner.is_client_error() {
            tracing::debug!(status = %status, error = %self.inner, "request rejected");
            self.inner.to_string()
        } else {
            tracing::error!(status = %status, error = %self.inner, "request failed");
            "internal server error".to_string()
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
