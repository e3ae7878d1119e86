//! Accepts a publish request, validates it, decomposes it into per-provider
//! attempts, executes them with bounded parallelism, and records per-target
//! results (spec.md §4.4). The worker pool is a fixed number of tokio tasks
//! each looping claim -> execute -> complete/fail, following the
//! interval-loop shape the teacher uses for its own background tasks.

mod validation;

pub use crosspost_store::model::PublishRequest;

use crosspost_core::{AppError, Clock, ErrorKind, IdGen, Provider, ResultError, TargetResult};
use crosspost_events::domain::{JobCompleted, JobFailed, JobStarted, NotificationCreated};
use crosspost_events::EventBus;
use crosspost_governor::RateGovernor;
use crosspost_providers::{AdapterError, Credentials, ProviderRegistry, PublishRequest as AdapterRequest};
use crosspost_store::model::{JobStatus, NewJob, NewNotification, PublishJob};
use crosspost_store::Store;
use futures::StreamExt;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Tunables with the spec's stated defaults (spec.md §4.4/§5).
#[derive(Debug, Clone)]
pub struct PublishEngineConfig {
    pub worker_count: usize,
    pub lease_duration: Duration,
    pub max_attempts: u32,
    pub max_fanout: usize,
    pub publish_now_deadline: Duration,
    pub claim_poll_interval: Duration,
}

impl Default for PublishEngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 8,
            lease_duration: Duration::from_secs(60),
            max_attempts: 3,
            max_fanout: 8,
            publish_now_deadline: Duration::from_secs(5),
            claim_poll_interval: Duration::from_millis(250),
        }
    }
}

/// Validates, enqueues, and executes publish jobs (spec.md §4.4).
#[derive(Clone)]
pub struct PublishEngine {
    store: Arc<dyn Store>,
    registry: Arc<ProviderRegistry>,
    governor: Arc<RateGovernor>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGen>,
    config: PublishEngineConfig,
}

impl PublishEngine {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ProviderRegistry>,
        governor: Arc<RateGovernor>,
        events: EventBus,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGen>,
        config: PublishEngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            governor,
            events,
            clock,
            ids,
            config,
        }
    }

    /// Validate, persist a `queued` job, return its id. Does not wait for
    /// execution (spec.md §4.4 `enqueue`).
    pub async fn enqueue(&self, user_id: Uuid, request: PublishRequest) -> Result<Uuid, AppError> {
        self.enqueue_inner(user_id, None, request).await
    }

    /// Same as `enqueue`, but links the created job to `post_id` so its
    /// terminal outcome is reflected back onto the originating Post
    /// (spec.md §4.6 step 2: "Record the returned jobId on the post").
    pub async fn enqueue_for_post(&self, user_id: Uuid, post_id: Uuid, request: PublishRequest) -> Result<Uuid, AppError> {
        self.enqueue_inner(user_id, Some(post_id), request).await
    }

    async fn enqueue_inner(&self, user_id: Uuid, post_id: Option<Uuid>, request: PublishRequest) -> Result<Uuid, AppError> {
        validation::validate(&self.registry, &*self.store, &*self.clock, user_id, &request).await?;

        if request.dry_run {
            let providers = request.providers.clone();
            let job = self.store.insert_job(NewJob { user_id, post_id, request }).await?;
            let results: HashMap<String, TargetResult> =
                providers.iter().map(|p| (p.as_str().to_string(), TargetResult::dry_run())).collect();
            self.store.complete_job(job.id, JobStatus::Completed, results).await?;
            return Ok(job.id);
        }

        let job = self.store.insert_job(NewJob { user_id, post_id, request }).await?;
        Ok(job.id)
    }

    /// Same validation as `enqueue`, but attempts inline execution under a
    /// short deadline before falling back to the normal async path
    /// (spec.md §4.4 `publishNow`).
    pub async fn publish_now(&self, user_id: Uuid, request: PublishRequest) -> Result<Uuid, AppError> {
        validation::validate(&self.registry, &*self.store, &*self.clock, user_id, &request).await?;
        let job = self.store.insert_job(NewJob { user_id, post_id: None, request }).await?;

        let worker_id = format!("inline-{}", self.ids.new_id());
        let cancel = CancellationToken::new();
        let claimed = self.store.claim_next_job(&worker_id, self.config.lease_duration).await?;
        if let Some(job) = claimed.filter(|j| j.id == job.id) {
            let _ = tokio::time::timeout(
                self.config.publish_now_deadline,
                self.execute_job(job, &worker_id, &cancel),
            )
            .await;
        }
        Ok(job.id)
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<PublishJob, AppError> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| AppError::validation(format!("job {job_id} not found")))
    }

    /// `queued -> canceled` directly, `running -> canceling` for the
    /// worker to observe (spec.md §4.4 Cancellation).
    pub async fn cancel_job(&self, job_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        Ok(self.store.cancel_job(job_id, user_id).await?)
    }

    /// Spawn the fixed worker pool; each task runs until `cancel` fires.
    pub fn run_workers(self: &Arc<Self>, cancel: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.config.worker_count)
            .map(|i| {
                let engine = self.clone();
                let cancel = cancel.clone();
                let worker_id = format!("worker-{i}");
                tokio::spawn(async move { engine.run_worker_loop(worker_id, cancel).await })
            })
            .collect()
    }

    async fn run_worker_loop(&self, worker_id: String, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            match self.store.claim_next_job(&worker_id, self.config.lease_duration).await {
                Ok(Some(job)) => self.execute_job(job, &worker_id, &cancel).await,
                Ok(None) => {
                    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..100));
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.claim_poll_interval + jitter) => {}
                        _ = cancel.cancelled() => return,
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, worker = %worker_id, "claim_next_job failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.claim_poll_interval) => {}
                        _ = cancel.cancelled() => return,
                    }
                }
            }
        }
    }

    async fn execute_job(&self, job: PublishJob, worker_id: &str, cancel: &CancellationToken) {
        self.events.emit(JobStarted { job_id: job.id, user_id: job.user_id }).await;

        let adapter_request = AdapterRequest {
            caption: job.request.0.caption.clone(),
            media: job.request.0.media.clone(),
            options: job.request.0.options.clone(),
        };
        let providers = job.request.0.providers.clone();
        let fanout = self.config.max_fanout.min(providers.len().max(1));

        let attempts = providers.into_iter().map(|provider| {
            let store = self.store.clone();
            let registry = self.registry.clone();
            let governor = self.governor.clone();
            let clock = self.clock.clone();
            let request = adapter_request.clone();
            let job_id = job.id;
            let user_id = job.user_id;
            let worker_id = worker_id.to_string();
            let lease = self.config.lease_duration;
            let max_attempts = self.config.max_attempts;
            let cancel = cancel.clone();
            async move {
                if is_canceling(&*store, job_id).await {
                    return single(provider, TargetResult::err(
                        ResultError::new(ErrorKind::Internal, "job canceled before this provider started"),
                        None,
                    ));
                }
                attempt_provider(
                    &*store, &registry, &governor, &*clock, user_id, provider, &request, job_id, &worker_id, lease,
                    max_attempts, &cancel,
                )
                .await
            }
        });

        let merged: HashMap<String, TargetResult> = futures::stream::iter(attempts)
            .buffer_unordered(fanout)
            .fold(HashMap::new(), |mut acc, partial| {
                acc.extend(partial);
                futures::future::ready(acc)
            })
            .await;

        let any_ok = merged.values().any(|r| r.ok);
        let all_ok = !merged.is_empty() && merged.values().all(|r| r.ok);
        let status = if all_ok { JobStatus::Completed } else { JobStatus::Failed };

        let store_result = if all_ok {
            self.store.complete_job(job.id, status, merged.clone()).await
        } else {
            self.store
                .fail_job(job.id, "one or more providers failed", merged.clone())
                .await
        };
        if let Err(err) = store_result {
            tracing::error!(error = %err, job_id = %job.id, "failed to persist terminal job state");
        }

        if let Some(post_id) = job.post_id {
            self.finish_post(post_id, job.user_id, any_ok, &merged).await;
        }

        if all_ok {
            self.events
                .emit(JobCompleted { job_id: job.id, user_id: job.user_id, results: merged })
                .await;
        } else {
            let error = merged
                .values()
                .find_map(|r| r.error.as_ref().map(|e| e.kind.clone()))
                .unwrap_or_else(|| ErrorKind::ProviderError.as_str().to_string());
            self.events
                .emit(JobFailed { job_id: job.id, user_id: job.user_id, results: merged, error })
                .await;
        }
    }

    /// Transition the originating Post and notify on any failing target.
    /// Partial success still marks the post `published` (spec.md §4.4 step
    /// 4 — deliberately opinionated, recorded in DESIGN.md).
    async fn finish_post(&self, post_id: Uuid, user_id: Uuid, any_ok: bool, results: &HashMap<String, TargetResult>) {
        let outcome = if any_ok {
            self.store.mark_post_published(post_id, self.clock.now()).await
        } else {
            let message = results
                .values()
                .find_map(|r| r.error.as_ref().map(|e| e.message.clone()))
                .unwrap_or_else(|| "publish failed".to_string());
            self.store.mark_post_failed(post_id, &message).await
        };
        if let Err(err) = outcome {
            tracing::error!(error = %err, post_id = %post_id, "failed to update post after publish");
        }

        for (target, result) in results {
            if result.ok {
                continue;
            }
            let message = result
                .error
                .as_ref()
                .map(|e| format!("Publishing to {target} failed: {}", e.message))
                .unwrap_or_else(|| format!("Publishing to {target} failed"));
            match self
                .store
                .create_notification(NewNotification { user_id, kind: "publish_failed".into(), message: message.clone() })
                .await
            {
                Ok(notification) => {
                    self.events
                        .emit(NotificationCreated {
                            user_id,
                            notification_id: notification.id,
                            kind: notification.kind,
                            message,
                        })
                        .await;
                }
                Err(err) => tracing::error!(error = %err, "failed to create failure notification"),
            }
        }
    }
}

fn single(provider: Provider, result: TargetResult) -> HashMap<String, TargetResult> {
    let mut map = HashMap::with_capacity(1);
    map.insert(provider.as_str().to_string(), result);
    map
}

async fn is_canceling(store: &dyn Store, job_id: Uuid) -> bool {
    matches!(store.get_job(job_id).await, Ok(Some(job)) if job.status == JobStatus::Canceling)
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let base_ms = 500u64.saturating_mul(1u64 << attempt.saturating_sub(1).min(6));
    let capped_ms = base_ms.min(30_000);
    let jitter_ms = rand::thread_rng().gen_range(0..250);
    Duration::from_millis(capped_ms + jitter_ms)
}

#[allow(clippy::too_many_arguments)]
async fn attempt_provider(
    store: &dyn Store,
    registry: &ProviderRegistry,
    governor: &RateGovernor,
    clock: &dyn Clock,
    user_id: Uuid,
    provider: Provider,
    request: &AdapterRequest,
    job_id: Uuid,
    worker_id: &str,
    lease: Duration,
    max_attempts: u32,
    cancel: &CancellationToken,
) -> HashMap<String, TargetResult> {
    let connection = match store.get_connection(user_id, provider).await {
        Ok(Some(conn)) if !conn.is_expired(clock.now()) => conn,
        Ok(_) => {
            return single(
                provider,
                TargetResult::err(ResultError::new(ErrorKind::NotConnected, format!("{provider} is not connected")), None),
            )
        }
        Err(err) => {
            return single(
                provider,
                TargetResult::err(ResultError::new(ErrorKind::BackendUnreachable, err.to_string()), None),
            )
        }
    };

    let Some(adapter) = registry.get(provider) else {
        return single(
            provider,
            TargetResult::err(ResultError::new(ErrorKind::UnsupportedProvider, format!("{provider} is unsupported")), None),
        );
    };

    let credentials = Credentials {
        provider_account_id: connection.provider_account_id.clone(),
        token: connection.credentials.0.clone(),
    };

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        if governor.acquire(provider, cancel).await.is_err() {
            return single(
                provider,
                TargetResult::err(ResultError::new(ErrorKind::Internal, "canceled while waiting for a rate-limit token"), None),
            );
        }
        governor.consume_quota(provider, 1).await;

        let started = Instant::now();
        match adapter.publish(&credentials, request, cancel).await {
            Ok(results) => return results,
            Err(AdapterError::Unsupported) => {
                return single(
                    provider,
                    TargetResult::err(ResultError::new(ErrorKind::UnsupportedProvider, "unsupported by adapter"), None),
                )
            }
            Err(AdapterError::Permanent(message)) => {
                return single(
                    provider,
                    TargetResult::err(
                        ResultError::new(ErrorKind::ProviderError, message),
                        Some(started.elapsed().as_millis() as u64),
                    ),
                )
            }
            Err(AdapterError::Transient(message)) => {
                if attempt >= max_attempts {
                    return single(
                        provider,
                        TargetResult::err(
                            ResultError::new(ErrorKind::ProviderError, message),
                            Some(started.elapsed().as_millis() as u64),
                        ),
                    );
                }
                let _ = store.renew_lease(job_id, worker_id, lease).await;
                tokio::select! {
                    _ = tokio::time::sleep(backoff_with_jitter(attempt)) => continue,
                    _ = cancel.cancelled() => {
                        return single(
                            provider,
                            TargetResult::err(ResultError::new(ErrorKind::Internal, "canceled during retry backoff"), None),
                        )
                    }
                }
            }
        }
    }
}
