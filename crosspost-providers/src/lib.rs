//! Provider adapter catalog (spec.md §4.2). `ProviderAdapter` is the
//! uniform `publish`/`import_recent` capability every social network
//! implements (either may be unsupported); `ProviderRegistry` is the
//! startup-built lookup the engine, scheduler, and importer all share.

pub mod adapters;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crosspost_core::{Provider, TargetResult};
use crosspost_governor::RateGovernor;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Errors an adapter can raise, classified the way the engine needs to
/// decide whether to retry (spec.md §4.4 step "c").
#[derive(Debug)]
pub enum AdapterError {
    /// This adapter does not implement the capability that was called.
    Unsupported,
    /// Network error, 5xx, or 429 — safe to retry with backoff.
    Transient(String),
    /// 4xx auth/validation/policy failure — retrying would not help.
    Permanent(String),
}

impl AdapterError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Transient(_))
    }

    /// Classify an HTTP response status the way every adapter needs to
    /// (spec.md §4.4 step "c": "transient (network, 5xx, 429) vs permanent
    /// (4xx auth, validation, policy)").
    pub fn from_status(status: reqwest::StatusCode, body: impl Into<String>) -> Self {
        let body = body.into();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            AdapterError::Transient(format!("{status}: {body}"))
        } else {
            AdapterError::Permanent(format!("{status}: {body}"))
        }
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterError::Unsupported => write!(f, "unsupported by this provider"),
            AdapterError::Transient(m) => write!(f, "transient provider error: {m}"),
            AdapterError::Permanent(m) => write!(f, "permanent provider error: {m}"),
        }
    }
}

impl std::error::Error for AdapterError {}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            AdapterError::Transient(err.to_string())
        } else if let Some(status) = err.status() {
            AdapterError::from_status(status, err.to_string())
        } else {
            AdapterError::Transient(err.to_string())
        }
    }
}

/// Opaque per-connection credentials, decoded from `SocialConnection` /
/// `UserSetting` blobs by the caller — adapters never touch the Store
/// directly for publish (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct Credentials {
    pub provider_account_id: String,
    pub token: serde_json::Value,
}

/// The adapter-facing view of a publish request — provider-agnostic;
/// caption/media validation already happened in the engine (spec.md §4.4).
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub caption: Option<String>,
    pub media: Vec<String>,
    pub options: Option<serde_json::Value>,
}

/// One piece of fetched content, ready for `Store::upsert_library_item`
/// modulo the `user_id`, which `ImportRunner` fills in (spec.md §4.7 step 4).
#[derive(Debug, Clone)]
pub struct ImportedItem {
    pub external_id: String,
    pub content_type: String,
    pub title: Option<String>,
    pub permalink_url: Option<String>,
    pub media_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub views: Option<i64>,
    pub likes: Option<i64>,
    pub raw_payload: serde_json::Value,
}

/// Each social network implements this uniform capability pair; either may
/// be unsupported (spec.md §4.2). Default methods return `Unsupported` so a
/// new adapter only needs to override what it actually does.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Perform one user-visible publish attempt. Providers that fan out to
    /// sub-targets (e.g. Facebook pages) return one entry per target,
    /// keyed by a stable `providerTargetId` (spec.md §4.2/§4.4 step "e").
    async fn publish(
        &self,
        _credentials: &Credentials,
        _request: &PublishRequest,
        _cancel: &CancellationToken,
    ) -> Result<HashMap<String, TargetResult>, AdapterError> {
        Err(AdapterError::Unsupported)
    }

    /// Best-effort recent-content fetch, already rate-limited through
    /// `governor` so paginated adapter-internal calls stay governed too
    /// (spec.md §4.7 step 3).
    async fn import_recent(
        &self,
        _credentials: &Credentials,
        _governor: &RateGovernor,
        _cancel: &CancellationToken,
    ) -> Result<Vec<ImportedItem>, AdapterError> {
        Err(AdapterError::Unsupported)
    }
}

/// Startup-built catalog of adapters (spec.md §4.2).
#[derive(Clone)]
pub struct ProviderRegistry {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new(adapters: impl IntoIterator<Item = Arc<dyn ProviderAdapter>>) -> Self {
        let mut map = HashMap::new();
        for adapter in adapters {
            map.insert(adapter.provider(), adapter);
        }
        Self { adapters: map }
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    /// The full production catalog from spec.md §4.2, sharing one
    /// `reqwest::Client` across adapters.
    pub fn production(client: reqwest::Client) -> Self {
        use adapters::*;
        Self::new([
            Arc::new(instagram::InstagramAdapter::new(client.clone())) as Arc<dyn ProviderAdapter>,
            Arc::new(facebook::FacebookAdapter::new(client.clone())),
            Arc::new(tiktok::TiktokAdapter::new(client.clone())),
            Arc::new(youtube::YoutubeAdapter::new(client.clone())),
            Arc::new(pinterest::PinterestAdapter::new(client.clone())),
            Arc::new(threads::ThreadsAdapter::new(client.clone())),
            Arc::new(x::XAdapter::new(client)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl ProviderAdapter for Noop {
        fn provider(&self) -> Provider {
            Provider::X
        }
    }

    #[tokio::test]
    async fn default_publish_is_unsupported() {
        let cancel = CancellationToken::new();
        let creds = Credentials {
            provider_account_id: "acct".into(),
            token: serde_json::json!({}),
        };
        let req = PublishRequest {
            caption: None,
            media: vec![],
            options: None,
        };
        let err = Noop.publish(&creds, &req, &cancel).await.unwrap_err();
        assert!(matches!(err, AdapterError::Unsupported));
    }

    #[test]
    fn registry_looks_up_by_provider() {
        let registry = ProviderRegistry::new([Arc::new(Noop) as Arc<dyn ProviderAdapter>]);
        assert!(registry.get(Provider::X).is_some());
        assert!(registry.get(Provider::Instagram).is_none());
    }
}
