//! Periodic sweep for due scheduled posts (spec.md §4.6). One tokio task,
//! `tokio::time::interval` + `CancellationToken`, the same interval-loop
//! shape `crosspost-engine`'s worker pool and `crosspost-governor`'s
//! `acquire` use.

use crosspost_core::Clock;
use crosspost_engine::{PublishEngine, PublishRequest};
use crosspost_store::model::Post;
use crosspost_store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tunables (spec.md §4.6: default 60s interval, batch 64).
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub batch_size: i64,
    /// Consecutive enqueue-validation failures before a post is marked
    /// `failed` instead of reverted to `scheduled` with backoff (spec.md
    /// §4.6 step 3 — count left to the implementation).
    pub max_consecutive_failures: i32,
    pub backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_size: 64,
            max_consecutive_failures: 5,
            backoff: Duration::from_secs(120),
        }
    }
}

pub struct Scheduler {
    store: Arc<dyn Store>,
    engine: Arc<PublishEngine>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(store: Arc<dyn Store>, engine: Arc<PublishEngine>, clock: Arc<dyn Clock>, config: SchedulerConfig) -> Self {
        Self { store, engine, clock, config }
    }

    /// Run the sweep loop until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = cancel.cancelled() => return,
            }
        }
    }

    /// One sweep: claim due posts, enqueue each, and record or recover from
    /// failures (spec.md §4.6).
    pub async fn tick(&self) {
        let now = self.clock.now();
        let due = match self.store.claim_due_scheduled_posts(now, self.config.batch_size).await {
            Ok(posts) => posts,
            Err(err) => {
                tracing::warn!(error = %err, "claim_due_scheduled_posts failed this tick");
                return;
            }
        };

        for post in due {
            self.publish_due_post(post).await;
        }
    }

    async fn publish_due_post(&self, post: Post) {
        let request = PublishRequest {
            providers: post.providers.0.clone(),
            caption: Some(post.content.clone()).filter(|c| !c.is_empty()),
            media: post.media.0.clone(),
            options: None,
            dry_run: false,
        };

        match self.engine.enqueue_for_post(post.user_id, post.id, request).await {
            Ok(job_id) => {
                if let Err(err) = self.store.set_post_publish_job(post.id, job_id).await {
                    tracing::error!(error = %err, post_id = %post.id, "failed to record job id on post");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, post_id = %post.id, "scheduled post failed enqueue validation");
                let failure_count = post.failure_count + 1;
                let outcome = if failure_count >= self.config.max_consecutive_failures {
                    self.store.mark_post_failed(post.id, &err.message).await
                } else {
                    let backoff_until = self.clock.now() + chrono::Duration::from_std(self.config.backoff).unwrap_or_default();
                    self.store.revert_post_to_scheduled(post.id, backoff_until, failure_count).await
                };
                if let Err(store_err) = outcome {
                    tracing::error!(error = %store_err, post_id = %post.id, "failed to record enqueue-failure backoff");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crosspost_core::clock::FixedClock;
    use crosspost_core::id::SequentialIdGen;
    use crosspost_core::Provider;
    use crosspost_engine::PublishEngineConfig;
    use crosspost_events::EventBus;
    use crosspost_governor::RateGovernor;
    use crosspost_providers::testing::MockAdapter;
    use crosspost_providers::ProviderAdapter;
    use crosspost_providers::ProviderRegistry;
    use crosspost_store::model::{NewPost, PostStatus, SocialConnection};
    use crosspost_store::testing::MemoryStore;
    use sqlx::types::Json;
    use uuid::Uuid;

    fn engine(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Arc<PublishEngine> {
        let x = Arc::new(MockAdapter::always_ok(Provider::X));
        Arc::new(PublishEngine::new(
            store,
            Arc::new(ProviderRegistry::new([x as Arc<dyn ProviderAdapter>])),
            Arc::new(RateGovernor::new([])),
            EventBus::new(),
            clock,
            Arc::new(SequentialIdGen::new()),
            PublishEngineConfig::default(),
        ))
    }

    /// Scenario 4: a single due post produces exactly one job and flips to
    /// `publishing` with `lastPublishJobId` set.
    #[tokio::test]
    async fn a_due_scheduled_post_is_claimed_and_enqueued_exactly_once() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(Utc::now()));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let user_id = Uuid::new_v4();
        store
            .seed_connection(SocialConnection {
                user_id,
                provider: Provider::X,
                provider_account_id: "acct".into(),
                credentials: Json(serde_json::json!({})),
                expires_at: None,
                created_at: clock.now(),
                updated_at: clock.now(),
            })
            .await;

        let post = store
            .create_post(NewPost {
                user_id,
                team_id: None,
                content: "scheduled hi".into(),
                providers: vec![Provider::X],
                media: vec![],
                status: PostStatus::Scheduled,
                scheduled_for: Some(clock.now() - chrono::Duration::seconds(1)),
            })
            .await
            .unwrap();

        let scheduler = Scheduler::new(
            store.clone(),
            engine(store.clone(), clock.clone()),
            clock.clone(),
            SchedulerConfig::default(),
        );
        scheduler.tick().await;

        let refreshed = store.get_post(post.id).await.unwrap().unwrap();
        assert_eq!(refreshed.status, PostStatus::Publishing);
        assert!(refreshed.last_publish_job_id.is_some());

        // A second tick must not claim the same post again: it is no
        // longer `scheduled`.
        scheduler.tick().await;
        let unchanged = store.get_post(post.id).await.unwrap().unwrap();
        assert_eq!(unchanged.last_publish_job_id, refreshed.last_publish_job_id);
    }

    #[tokio::test]
    async fn enqueue_validation_failure_reverts_to_scheduled_with_backoff() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(Utc::now()));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let user_id = Uuid::new_v4();
        // No connection seeded for X: enqueue must fail `not_connected`.
        let post = store
            .create_post(NewPost {
                user_id,
                team_id: None,
                content: "scheduled hi".into(),
                providers: vec![Provider::X],
                media: vec![],
                status: PostStatus::Scheduled,
                scheduled_for: Some(clock.now() - chrono::Duration::seconds(1)),
            })
            .await
            .unwrap();

        let scheduler = Scheduler::new(
            store.clone(),
            engine(store.clone(), clock.clone()),
            clock.clone(),
            SchedulerConfig::default(),
        );
        scheduler.tick().await;

        let reverted = store.get_post(post.id).await.unwrap().unwrap();
        assert_eq!(reverted.status, PostStatus::Scheduled);
        assert_eq!(reverted.failure_count, 1);
        assert!(reverted.scheduled_for.unwrap() > clock.now());
    }
}
