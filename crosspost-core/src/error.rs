//! Cross-cutting error taxonomy (spec.md §7). One enum shared by the
//! engine, the HTTP layer, and the Store boundary, matching `r2e-data`'s
//! `DataError`/`example-postgres`'s `HttpError` style: a plain enum with a
//! hand-written `Display`/`Error` impl, no `thiserror`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// The structured error kinds surfaced on the wire (spec.md §6 error
/// envelope kinds) and recorded in a job's per-provider result map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedProvider,
    MediaRequired,
    NotConnected,
    MissingCredentials,
    ProviderRateLimited,
    ProviderError,
    BackendUnreachable,
    ValidationFailed,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedProvider => "unsupported_provider",
            ErrorKind::MediaRequired => "media_required",
            ErrorKind::NotConnected => "not_connected",
            ErrorKind::MissingCredentials => "missing_credentials",
            ErrorKind::ProviderRateLimited => "provider_rate_limited",
            ErrorKind::ProviderError => "provider_error",
            ErrorKind::BackendUnreachable => "backend_unreachable",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::Internal => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ErrorKind::UnsupportedProvider
            | ErrorKind::MediaRequired
            | ErrorKind::NotConnected
            | ErrorKind::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorKind::MissingCredentials => StatusCode::UNAUTHORIZED,
            ErrorKind::ProviderRateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::ProviderError => StatusCode::BAD_GATEWAY,
            ErrorKind::BackendUnreachable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user/operator-facing error: an `ErrorKind`, a human message, and an
/// optional structured details blob (spec.md §6 error envelope).
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<Value>,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationFailed, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for AppError {}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    ok: bool,
    error: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        let body = ErrorEnvelope {
            ok: false,
            error: self.kind.as_str(),
            message: &self.message,
            details: self.details.as_ref(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = AppError::new(ErrorKind::NotConnected, "instagram is not connected");
        assert_eq!(err.to_string(), "not_connected: instagram is not connected");
    }
}
