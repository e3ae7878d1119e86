//! Per-provider background import sweep (spec.md §4.7): one independent
//! loop per enabled provider, same interval-loop shape as
//! `crosspost-scheduler::Scheduler`.

use crosspost_core::{Clock, Provider};
use crosspost_governor::RateGovernor;
use crosspost_providers::ProviderRegistry;
use crosspost_store::model::NewLibraryItem;
use crosspost_store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-provider tunables (spec.md §4.7: `provider.importInterval`,
/// §4.3: `dailyMax`, `0` = unlimited).
#[derive(Debug, Clone, Copy)]
pub struct ImportSettings {
    pub interval: Duration,
    pub daily_max: u32,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            daily_max: 0,
        }
    }
}

/// One provider's background import loop.
pub struct ImportRunner {
    provider: Provider,
    store: Arc<dyn Store>,
    registry: Arc<ProviderRegistry>,
    governor: Arc<RateGovernor>,
    clock: Arc<dyn Clock>,
    settings: ImportSettings,
}

impl ImportRunner {
    pub fn new(
        provider: Provider,
        store: Arc<dyn Store>,
        registry: Arc<ProviderRegistry>,
        governor: Arc<RateGovernor>,
        clock: Arc<dyn Clock>,
        settings: ImportSettings,
    ) -> Self {
        Self { provider, store, registry, governor, clock, settings }
    }

    /// Run the sweep loop for this provider until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(&cancel).await,
                _ = cancel.cancelled() => return,
            }
        }
    }

    /// One sweep across every user with stored credentials for this
    /// provider. A single user's failure never blocks the rest (spec.md
    /// §4.7 "Error semantics").
    pub async fn tick(&self, cancel: &CancellationToken) {
        let key = self.provider.oauth_setting_key();
        let users = match self.store.list_users_with_setting(&key).await {
            Ok(users) => users,
            Err(err) => {
                tracing::warn!(provider = %self.provider.as_str(), error = %err, "list_users_with_setting failed this tick");
                return;
            }
        };

        let Some(adapter) = self.registry.get(self.provider) else {
            tracing::warn!(provider = %self.provider.as_str(), "import tick skipped: no adapter registered");
            return;
        };

        for user_id in users {
            if cancel.is_cancelled() {
                return;
            }
            self.import_for_user(&adapter, user_id, cancel).await;
        }
    }

    async fn import_for_user(
        &self,
        adapter: &Arc<dyn crosspost_providers::ProviderAdapter>,
        user_id: uuid::Uuid,
        cancel: &CancellationToken,
    ) {
        let connection = match self.store.get_connection(user_id, self.provider).await {
            Ok(Some(conn)) => conn,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(provider = %self.provider.as_str(), %user_id, error = %err, "get_connection failed");
                return;
            }
        };

        if self.governor.acquire(self.provider, cancel).await.is_err() {
            return;
        }
        self.governor.consume_quota(self.provider, 1).await;

        let today = self.clock.now().date_naive();
        match self.store.consume_import_quota(self.provider, today, 1, self.settings.daily_max).await {
            Ok(quota) if !quota.ok => {
                tracing::info!(
                    provider = %self.provider.as_str(),
                    %user_id,
                    reason = "daily_quota_exceeded",
                    "import skipped"
                );
                return;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(provider = %self.provider.as_str(), %user_id, error = %err, "consume_import_quota failed");
                return;
            }
        }

        let credentials = crosspost_providers::Credentials {
            provider_account_id: connection.provider_account_id.clone(),
            token: connection.credentials.0.clone(),
        };

        let items = match adapter.import_recent(&credentials, &self.governor, cancel).await {
            Ok(items) => items,
            Err(err) => {
                tracing::warn!(provider = %self.provider.as_str(), %user_id, error = ?err, "import_recent failed");
                return;
            }
        };

        for item in items {
            let new_item = NewLibraryItem {
                user_id,
                network: self.provider,
                external_id: item.external_id,
                content_type: item.content_type,
                title: item.title,
                permalink_url: item.permalink_url,
                media_url: item.media_url,
                thumbnail_url: item.thumbnail_url,
                posted_at: item.posted_at,
                views: item.views,
                likes: item.likes,
                raw_payload: item.raw_payload,
            };
            if let Err(err) = self.store.upsert_library_item(new_item).await {
                tracing::warn!(provider = %self.provider.as_str(), %user_id, error = %err, "upsert_library_item failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crosspost_core::clock::FixedClock;
    use crosspost_providers::testing::MockAdapter;
    use crosspost_providers::{ImportedItem, ProviderAdapter};
    use crosspost_store::model::SocialConnection;
    use crosspost_store::testing::MemoryStore;
    use sqlx::types::Json;
    use uuid::Uuid;

    fn seeded_connection(user_id: Uuid, provider: Provider, now: chrono::DateTime<Utc>) -> SocialConnection {
        SocialConnection {
            user_id,
            provider,
            provider_account_id: "acct".into(),
            credentials: Json(serde_json::json!({ "access_token": "token" })),
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_item(external_id: &str) -> ImportedItem {
        ImportedItem {
            external_id: external_id.into(),
            content_type: "video".into(),
            title: Some("t".into()),
            permalink_url: Some("https://x/1".into()),
            media_url: None,
            thumbnail_url: None,
            posted_at: None,
            views: Some(10),
            likes: Some(1),
            raw_payload: serde_json::json!({}),
        }
    }

    /// Scenario 5: dailyMax=1 denies the second tick in the same UTC day,
    /// with no adapter call and no upsert.
    #[tokio::test]
    async fn second_tick_in_the_same_day_is_skipped_once_daily_quota_is_exhausted() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(Utc::now()));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let user_id = Uuid::new_v4();
        store.seed_setting(user_id, Provider::X.oauth_setting_key(), serde_json::json!(true)).await;
        store.seed_connection(seeded_connection(user_id, Provider::X, clock.now())).await;

        let adapter = Arc::new(MockAdapter::with_import_items(Provider::X, vec![sample_item("v1")]));
        let registry = Arc::new(ProviderRegistry::new([adapter.clone() as Arc<dyn ProviderAdapter>]));
        let governor = Arc::new(RateGovernor::new([(
            Provider::X,
            crosspost_governor::RateLimit { requests_per_second: 100.0, burst: 100 },
        )]));

        let runner = ImportRunner::new(
            Provider::X,
            store.clone(),
            registry,
            governor,
            clock,
            ImportSettings { interval: Duration::from_secs(60), daily_max: 1 },
        );
        let cancel = CancellationToken::new();

        runner.tick(&cancel).await;
        assert_eq!(adapter.import_call_count(), 1);
        let items = store.list_library_items(user_id, Some(Provider::X)).await.unwrap();
        assert_eq!(items.len(), 1);

        runner.tick(&cancel).await;
        assert_eq!(adapter.import_call_count(), 1, "second tick must be skipped by the daily quota, no adapter call");
        let items = store.list_library_items(user_id, Some(Provider::X)).await.unwrap();
        assert_eq!(items.len(), 1, "no new upsert on the skipped tick");
    }

    #[tokio::test]
    async fn one_users_failure_never_blocks_the_rest_of_the_tick() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(Utc::now()));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let healthy_user = Uuid::new_v4();
        let no_connection_user = Uuid::new_v4();
        store.seed_setting(healthy_user, Provider::X.oauth_setting_key(), serde_json::json!(true)).await;
        store.seed_setting(no_connection_user, Provider::X.oauth_setting_key(), serde_json::json!(true)).await;
        store.seed_connection(seeded_connection(healthy_user, Provider::X, clock.now())).await;
        // `no_connection_user` has the setting but no connection row: get_connection
        // returns Ok(None) and the import loop moves on without failing the tick.

        let adapter = Arc::new(MockAdapter::with_import_items(Provider::X, vec![sample_item("v1")]));
        let registry = Arc::new(ProviderRegistry::new([adapter.clone() as Arc<dyn ProviderAdapter>]));
        let governor = Arc::new(RateGovernor::new([]));

        let runner = ImportRunner::new(
            Provider::X,
            store.clone(),
            registry,
            governor,
            clock,
            ImportSettings::default(),
        );
        runner.tick(&CancellationToken::new()).await;

        assert_eq!(adapter.import_call_count(), 1, "only the connected user triggers an adapter call");
        let items = store.list_library_items(healthy_user, Some(Provider::X)).await.unwrap();
        assert_eq!(items.len(), 1);
    }
}
