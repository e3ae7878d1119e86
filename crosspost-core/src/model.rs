//! Small data shapes shared across the store, engine, providers, and
//! events crates — kept here (rather than in the Store) because they carry
//! no persistence concerns of their own; they're just the vocabulary every
//! component speaks.

use serde::{Deserialize, Serialize};

/// The outcome of one publish attempt against one provider target
/// (spec.md §3 `PublishJob.results`, §4.4 step "e").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permalink_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResultError>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

impl TargetResult {
    pub fn ok(external_id: impl Into<String>, permalink_url: Option<String>, latency_ms: u64) -> Self {
        Self {
            ok: true,
            external_id: Some(external_id.into()),
            permalink_url,
            latency_ms: Some(latency_ms),
            error: None,
            dry_run: false,
        }
    }

    pub fn dry_run() -> Self {
        Self {
            ok: true,
            external_id: None,
            permalink_url: None,
            latency_ms: None,
            error: None,
            dry_run: true,
        }
    }

    pub fn err(error: ResultError, latency_ms: Option<u64>) -> Self {
        Self {
            ok: false,
            external_id: None,
            permalink_url: None,
            latency_ms,
            error: Some(error),
            dry_run: false,
        }
    }
}

/// The small error object attached to a failing `TargetResult`
/// (spec.md §4.4 step "e": `{kind, message, providerHttpStatus?}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultError {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_http_status: Option<u16>,
}

impl ResultError {
    pub fn new(kind: crate::error::ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            message: message.into(),
            provider_http_status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.provider_http_status = Some(status);
        self
    }
}
