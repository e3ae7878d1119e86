//! The end-to-end scenarios from spec.md §8 that exercise `PublishEngine`
//! directly, against an in-memory `Store` and scripted provider adapters so
//! they run without a real Postgres instance or network (scenarios 4 and 5,
//! which exercise the scheduler and importer, live in those crates' own
//! test suites).

use chrono::Utc;
use crosspost_core::clock::FixedClock;
use crosspost_core::id::SequentialIdGen;
use crosspost_core::{Clock, ErrorKind, Provider};
use crosspost_engine::{PublishEngine, PublishEngineConfig, PublishRequest};
use crosspost_events::EventBus;
use crosspost_governor::RateGovernor;
use crosspost_providers::testing::{MockAdapter, Scripted};
use crosspost_providers::ProviderAdapter;
use crosspost_providers::ProviderRegistry;
use crosspost_store::model::{JobStatus, SocialConnection};
use crosspost_store::testing::MemoryStore;
use crosspost_store::Store;
use sqlx::types::Json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn social_connection(user_id: Uuid, provider: Provider, now: chrono::DateTime<Utc>) -> SocialConnection {
    SocialConnection {
        user_id,
        provider,
        provider_account_id: "acct-1".into(),
        credentials: Json(serde_json::json!({ "access_token": "token" })),
        expires_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn publish_request(providers: Vec<Provider>) -> PublishRequest {
    PublishRequest {
        providers,
        caption: Some("hi".into()),
        media: vec!["https://m/a.jpg".into()],
        options: None,
        dry_run: false,
    }
}

fn test_engine(
    store: Arc<dyn Store>,
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    clock: Arc<dyn Clock>,
    config: PublishEngineConfig,
) -> PublishEngine {
    PublishEngine::new(
        store,
        Arc::new(ProviderRegistry::new(adapters)),
        Arc::new(RateGovernor::new([])),
        EventBus::new(),
        clock,
        Arc::new(SequentialIdGen::new()),
        config,
    )
}

/// Scenario 1: happy path, two providers.
#[tokio::test]
async fn happy_path_two_providers_both_succeed() {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(Utc::now()));
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let user_id = Uuid::new_v4();
    store.seed_connection(social_connection(user_id, Provider::Instagram, clock.now())).await;
    store.seed_connection(social_connection(user_id, Provider::Facebook, clock.now())).await;

    let instagram = Arc::new(MockAdapter::always_ok(Provider::Instagram));
    let facebook = Arc::new(MockAdapter::always_ok(Provider::Facebook));
    let engine = test_engine(
        store.clone(),
        vec![instagram.clone(), facebook.clone()],
        clock,
        PublishEngineConfig::default(),
    );

    let job_id = engine
        .publish_now(user_id, publish_request(vec![Provider::Instagram, Provider::Facebook]))
        .await
        .unwrap();

    let job = engine.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.results.0["instagram"].ok);
    assert!(job.results.0["facebook"].ok);
    assert_eq!(instagram.call_count(), 1);
    assert_eq!(facebook.call_count(), 1);
}

/// Scenario 2: partial failure — one permanent provider error, one success,
/// no retry on the failing side.
#[tokio::test]
async fn partial_failure_marks_job_failed_without_retrying_the_permanent_error() {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(Utc::now()));
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let user_id = Uuid::new_v4();
    store.seed_connection(social_connection(user_id, Provider::Instagram, clock.now())).await;
    store.seed_connection(social_connection(user_id, Provider::Facebook, clock.now())).await;

    let instagram = Arc::new(MockAdapter::new(
        Provider::Instagram,
        vec![Scripted::Permanent("policy_violation".into())],
    ));
    let facebook = Arc::new(MockAdapter::always_ok(Provider::Facebook));
    let engine = test_engine(
        store.clone(),
        vec![instagram.clone(), facebook.clone()],
        clock,
        PublishEngineConfig::default(),
    );

    let job_id = engine
        .publish_now(user_id, publish_request(vec![Provider::Instagram, Provider::Facebook]))
        .await
        .unwrap();

    let job = engine.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    let instagram_result = &job.results.0["instagram"];
    assert!(!instagram_result.ok);
    assert_eq!(instagram_result.error.as_ref().unwrap().kind, ErrorKind::ProviderError.as_str());
    assert!(job.results.0["facebook"].ok);
    assert_eq!(instagram.call_count(), 1, "a permanent error must not be retried");
}

/// Scenario 3: media-required validation still fires under `dryRun=true`.
#[tokio::test]
async fn missing_media_for_instagram_fails_validation_even_as_a_dry_run() {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(Utc::now()));
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new(clock.clone()));
    let instagram = Arc::new(MockAdapter::always_ok(Provider::Instagram));
    let engine = test_engine(store, vec![instagram], clock, PublishEngineConfig::default());

    let request = PublishRequest {
        providers: vec![Provider::Instagram],
        caption: Some("hi".into()),
        media: vec![],
        options: None,
        dry_run: true,
    };

    let err = engine.enqueue(Uuid::new_v4(), request).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::MediaRequired);
}

/// Scenario 6: a crashed worker's lease expires and a second worker
/// reclaims and completes the same job exactly once.
#[tokio::test]
async fn lease_reclaim_after_a_worker_crash() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let store = Arc::new(MemoryStore::new(clock.clone() as Arc<dyn Clock>));
    let user_id = Uuid::new_v4();
    store.seed_connection(social_connection(user_id, Provider::X, clock.now())).await;

    let x = Arc::new(MockAdapter::always_ok(Provider::X));
    let config = PublishEngineConfig {
        lease_duration: Duration::from_secs(30),
        claim_poll_interval: Duration::from_millis(5),
        ..PublishEngineConfig::default()
    };
    let engine = Arc::new(test_engine(
        store.clone(),
        vec![x.clone()],
        clock.clone() as Arc<dyn Clock>,
        config,
    ));

    let job_id = engine
        .enqueue(user_id, publish_request(vec![Provider::X]))
        .await
        .unwrap();

    // A worker claims the job, then crashes: no completion, no lease renewal.
    let crashed_claim = store.claim_next_job("worker-crashed", Duration::from_secs(30)).await.unwrap().unwrap();
    assert_eq!(crashed_claim.id, job_id);

    clock.advance(chrono::Duration::seconds(31));

    let cancel = CancellationToken::new();
    let handles = engine.run_workers(cancel.clone());

    let mut job = engine.get_job(job_id).await.unwrap();
    for _ in 0..200 {
        if job.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        job = engine.get_job(job_id).await.unwrap();
    }
    cancel.cancel();
    for handle in handles {
        handle.abort();
    }

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(x.call_count(), 1, "the reclaimed job must run to completion exactly once");
}
