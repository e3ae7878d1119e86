//! A scriptable `ProviderAdapter` double (spec.md §9 test tooling ambient
//! concern), gated behind `#[cfg(any(test, feature = "testing"))]` and
//! never compiled into the release binary.

use crate::{AdapterError, Credentials, ImportedItem, ProviderAdapter, PublishRequest};
use async_trait::async_trait;
use crosspost_core::{Provider, TargetResult};
use crosspost_governor::RateGovernor;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// What `MockAdapter::publish` should do on its next call(s).
pub enum Scripted {
    Ok(HashMap<String, TargetResult>),
    Transient(String),
    Permanent(String),
}

/// A `ProviderAdapter` whose behavior is scripted per-call, so engine tests
/// can exercise retry, partial success, and not-connected paths without a
/// real network.
pub struct MockAdapter {
    provider: Provider,
    script: Mutex<Vec<Scripted>>,
    calls: AtomicUsize,
    import_items: Vec<ImportedItem>,
    import_calls: AtomicUsize,
}

impl MockAdapter {
    pub fn new(provider: Provider, script: Vec<Scripted>) -> Self {
        Self {
            provider,
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            import_items: Vec::new(),
            import_calls: AtomicUsize::new(0),
        }
    }

    /// Always succeeds with a single target keyed by the provider name.
    pub fn always_ok(provider: Provider) -> Self {
        let mut results = HashMap::new();
        results.insert(provider.as_str().to_string(), TargetResult::ok("mock-id", None, 1));
        Self::new(provider, vec![Scripted::Ok(results)])
    }

    /// Returns the same fixed set of items on every `import_recent` call.
    pub fn with_import_items(provider: Provider, items: Vec<ImportedItem>) -> Self {
        Self {
            import_items: items,
            ..Self::new(provider, vec![])
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn import_call_count(&self) -> usize {
        self.import_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn publish(
        &self,
        _credentials: &Credentials,
        _request: &PublishRequest,
        _cancel: &CancellationToken,
    ) -> Result<HashMap<String, TargetResult>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().expect("mock adapter mutex poisoned");
        if script.is_empty() {
            return Err(AdapterError::Permanent("mock adapter script exhausted".into()));
        }
        match script.remove(0) {
            Scripted::Ok(results) => Ok(results),
            Scripted::Transient(m) => Err(AdapterError::Transient(m)),
            Scripted::Permanent(m) => Err(AdapterError::Permanent(m)),
        }
    }

    async fn import_recent(
        &self,
        _credentials: &Credentials,
        _governor: &RateGovernor,
        _cancel: &CancellationToken,
    ) -> Result<Vec<ImportedItem>, AdapterError> {
        self.import_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.import_items.clone())
    }
}
