//! An in-memory `Store` double, grounded in the same idea as `dog-queue`'s
//! `backend::memory` module: give every other crate's tests a fast,
//! dependency-free stand-in for the real backend that still honors the
//! trait's atomicity contracts (claim-once, FIFO order, quota gating).
//!
//! Gated behind `#[cfg(any(test, feature = "testing"))]` — never compiled
//! into the release binary.

use crate::error::StoreError;
use crate::model::*;
use crate::Store;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use crosspost_core::{Clock, Provider, TargetResult};
use sqlx::types::Json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    posts: HashMap<Uuid, Post>,
    jobs: HashMap<Uuid, PublishJob>,
    connections: HashMap<(Uuid, Provider), SocialConnection>,
    settings: HashMap<(Uuid, String), serde_json::Value>,
    library_items: HashMap<(Uuid, Provider, String), LibraryItem>,
    import_usage: HashMap<(Provider, NaiveDate), u32>,
    notifications: HashMap<Uuid, Notification>,
}

pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Seed a social connection directly, bypassing the (external) OAuth
    /// flow the real Store only ever reads from — convenience for tests
    /// that need a user already connected to a provider.
    pub async fn seed_connection(&self, connection: SocialConnection) {
        let mut inner = self.inner.lock().await;
        inner
            .connections
            .insert((connection.user_id, connection.provider), connection);
    }

    pub async fn seed_setting(&self, user_id: Uuid, key: impl Into<String>, value: serde_json::Value) {
        let mut inner = self.inner.lock().await;
        inner.settings.insert((user_id, key.into()), value);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_post(&self, post: NewPost) -> Result<Post, StoreError> {
        let now = self.clock.now();
        let row = Post {
            id: Uuid::now_v7(),
            user_id: post.user_id,
            team_id: post.team_id,
            content: post.content,
            providers: Json(post.providers),
            media: Json(post.media),
            status: post.status,
            scheduled_for: post.scheduled_for,
            published_at: None,
            last_publish_job_id: None,
            last_publish_error: None,
            failure_count: 0,
            created_at: now,
            updated_at: now,
        };
        let mut inner = self.inner.lock().await;
        inner.posts.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>, StoreError> {
        Ok(self.inner.lock().await.posts.get(&post_id).cloned())
    }

    async fn list_posts(&self, user_id: Uuid) -> Result<Vec<Post>, StoreError> {
        let inner = self.inner.lock().await;
        let mut posts: Vec<Post> = inner.posts.values().filter(|p| p.user_id == user_id).cloned().collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts)
    }

    async fn delete_post(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.posts.get(&post_id) {
            Some(p) if p.user_id == user_id => {
                inner.posts.remove(&post_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_due_scheduled_posts(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Post>, StoreError> {
        let mut inner = self.inner.lock().await;
        let mut due: Vec<Uuid> = inner
            .posts
            .values()
            .filter(|p| p.status == PostStatus::Scheduled && p.scheduled_for.is_some_and(|at| at <= now))
            .map(|p| p.id)
            .collect();
        due.sort_by_key(|id| (inner.posts[id].scheduled_for, *id));
        due.truncate(limit.max(0) as usize);

        let mut claimed = Vec::with_capacity(due.len());
        for id in due {
            if let Some(post) = inner.posts.get_mut(&id) {
                post.status = PostStatus::Publishing;
                post.updated_at = now;
                claimed.push(post.clone());
            }
        }
        Ok(claimed)
    }

    async fn set_post_publish_job(&self, post_id: Uuid, job_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(post) = inner.posts.get_mut(&post_id) {
            post.last_publish_job_id = Some(job_id);
            post.updated_at = self.clock.now();
        }
        Ok(())
    }

    async fn mark_post_published(&self, post_id: Uuid, published_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(post) = inner.posts.get_mut(&post_id) {
            post.status = PostStatus::Published;
            post.published_at = Some(published_at);
            post.updated_at = published_at;
        }
        Ok(())
    }

    async fn mark_post_failed(&self, post_id: Uuid, error: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(post) = inner.posts.get_mut(&post_id) {
            post.status = PostStatus::Failed;
            post.last_publish_error = Some(error.to_string());
            post.updated_at = self.clock.now();
        }
        Ok(())
    }

    async fn revert_post_to_scheduled(
        &self,
        post_id: Uuid,
        backoff_until: DateTime<Utc>,
        failure_count: i32,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(post) = inner.posts.get_mut(&post_id) {
            post.status = PostStatus::Scheduled;
            post.scheduled_for = Some(backoff_until);
            post.failure_count = failure_count;
            post.updated_at = self.clock.now();
        }
        Ok(())
    }

    async fn insert_job(&self, job: NewJob) -> Result<PublishJob, StoreError> {
        let now = self.clock.now();
        let row = PublishJob {
            id: Uuid::now_v7(),
            user_id: job.user_id,
            post_id: job.post_id,
            status: JobStatus::Queued,
            request: Json(job.request),
            results: Json(HashMap::new()),
            worker_id: None,
            lease_expires_at: None,
            created_at: now,
            updated_at: now,
        };
        let mut inner = self.inner.lock().await;
        inner.jobs.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<PublishJob>, StoreError> {
        Ok(self.inner.lock().await.jobs.get(&job_id).cloned())
    }

    async fn claim_next_job(&self, worker_id: &str, lease: Duration) -> Result<Option<PublishJob>, StoreError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        let mut claimable: Vec<Uuid> = inner
            .jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Queued
                    || (j.status == JobStatus::Running && j.lease_expires_at.is_some_and(|exp| exp <= now))
            })
            .map(|j| j.id)
            .collect();
        claimable.sort_by_key(|id| (inner.jobs[id].created_at, *id));

        let Some(id) = claimable.into_iter().next() else {
            return Ok(None);
        };
        let job = inner.jobs.get_mut(&id).expect("just selected");
        job.status = JobStatus::Running;
        job.worker_id = Some(worker_id.to_string());
        job.lease_expires_at = Some(now + chrono::Duration::from_std(lease).unwrap_or_default());
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn renew_lease(&self, job_id: Uuid, worker_id: &str, lease: Duration) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        match inner.jobs.get_mut(&job_id) {
            Some(job)
                if job.worker_id.as_deref() == Some(worker_id)
                    && matches!(job.status, JobStatus::Running | JobStatus::Canceling) =>
            {
                job.lease_expires_at = Some(now + chrono::Duration::from_std(lease).unwrap_or_default());
                job.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        results: HashMap<String, TargetResult>,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        if let Some(job) = inner.jobs.get_mut(&job_id) {
            job.status = status;
            job.results = Json(results);
            job.lease_expires_at = None;
            job.updated_at = now;
        }
        Ok(())
    }

    async fn fail_job(&self, job_id: Uuid, _error: &str, results: HashMap<String, TargetResult>) -> Result<(), StoreError> {
        self.complete_job(job_id, JobStatus::Failed, results).await
    }

    async fn cancel_job(&self, job_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        match inner.jobs.get_mut(&job_id) {
            Some(job) if job.user_id == user_id && job.status == JobStatus::Queued => {
                job.status = JobStatus::Canceled;
                job.updated_at = now;
                Ok(true)
            }
            Some(job) if job.user_id == user_id && job.status == JobStatus::Running => {
                job.status = JobStatus::Canceling;
                job.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_connection(&self, user_id: Uuid, provider: Provider) -> Result<Option<SocialConnection>, StoreError> {
        Ok(self.inner.lock().await.connections.get(&(user_id, provider)).cloned())
    }

    async fn list_users_with_setting(&self, key: &str) -> Result<Vec<Uuid>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .settings
            .keys()
            .filter(|(_, k)| k == key)
            .map(|(user_id, _)| *user_id)
            .collect())
    }

    async fn upsert_library_item(&self, item: NewLibraryItem) -> Result<LibraryItem, StoreError> {
        let now = self.clock.now();
        let key = (item.user_id, item.network, item.external_id.clone());
        let mut inner = self.inner.lock().await;
        let existing_id = inner.library_items.get(&key).map(|i| i.id);
        let row = LibraryItem {
            id: existing_id.unwrap_or_else(Uuid::now_v7),
            user_id: item.user_id,
            network: item.network,
            external_id: item.external_id,
            content_type: item.content_type,
            title: item.title,
            permalink_url: item.permalink_url,
            media_url: item.media_url,
            thumbnail_url: item.thumbnail_url,
            posted_at: item.posted_at,
            views: item.views,
            likes: item.likes,
            raw_payload: Json(item.raw_payload),
            created_at: existing_id.map(|_| now).unwrap_or(now),
            updated_at: now,
        };
        inner.library_items.insert(key, row.clone());
        Ok(row)
    }

    async fn list_library_items(&self, user_id: Uuid, network: Option<Provider>) -> Result<Vec<LibraryItem>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .library_items
            .values()
            .filter(|i| i.user_id == user_id && network.map_or(true, |n| n == i.network))
            .cloned()
            .collect())
    }

    async fn delete_library_item(&self, user_id: Uuid, item_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let key = inner
            .library_items
            .iter()
            .find(|(_, v)| v.id == item_id && v.user_id == user_id)
            .map(|(k, _)| k.clone());
        match key {
            Some(key) => {
                inner.library_items.remove(&key);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn consume_import_quota(
        &self,
        provider: Provider,
        day: NaiveDate,
        add: u32,
        daily_max: u32,
    ) -> Result<QuotaResult, StoreError> {
        let mut inner = self.inner.lock().await;
        let used = inner.import_usage.entry((provider, day)).or_insert(0);
        *used += add;
        let ok = daily_max == 0 || *used <= daily_max;
        Ok(QuotaResult { ok, used: *used })
    }

    async fn create_notification(&self, notification: NewNotification) -> Result<Notification, StoreError> {
        let row = Notification {
            id: Uuid::now_v7(),
            user_id: notification.user_id,
            kind: notification.kind,
            message: notification.message,
            is_read: false,
            created_at: self.clock.now(),
        };
        let mut inner = self.inner.lock().await;
        inner.notifications.insert(row.id, row.clone());
        Ok(row)
    }

    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        let inner = self.inner.lock().await;
        let mut notifications: Vec<Notification> = inner
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosspost_core::clock::FixedClock;

    fn store() -> MemoryStore {
        MemoryStore::new(Arc::new(FixedClock::new(Utc::now())))
    }

    #[tokio::test]
    async fn claim_next_job_is_exclusive_and_fifo() {
        let store = store();
        let user_id = Uuid::new_v4();
        let first = store
            .insert_job(NewJob {
                user_id,
                post_id: None,
                request: PublishRequest {
                    providers: vec![Provider::X],
                    caption: Some("first".into()),
                    media: vec![],
                    options: None,
                    dry_run: false,
                },
            })
            .await
            .unwrap();
        let _second = store
            .insert_job(NewJob {
                user_id,
                post_id: None,
                request: PublishRequest {
                    providers: vec![Provider::X],
                    caption: Some("second".into()),
                    media: vec![],
                    options: None,
                    dry_run: false,
                },
            })
            .await
            .unwrap();

        let claimed = store.claim_next_job("worker-a", Duration::from_secs(30)).await.unwrap().unwrap();
        assert_eq!(claimed.id, first.id);

        // A second worker must not be able to claim the same job again
        // while its lease is alive.
        let other = store.claim_next_job("worker-b", Duration::from_secs(30)).await.unwrap().unwrap();
        assert_ne!(other.id, first.id);
    }

    #[tokio::test]
    async fn consume_import_quota_denies_once_daily_max_exceeded() {
        let store = store();
        let day = Utc::now().date_naive();
        let first = store.consume_import_quota(Provider::Instagram, day, 3, 3).await.unwrap();
        assert!(first.ok);
        let second = store.consume_import_quota(Provider::Instagram, day, 1, 3).await.unwrap();
        assert!(!second.ok);
        assert_eq!(second.used, 4);
    }

    #[tokio::test]
    async fn upsert_library_item_updates_in_place_on_conflict() {
        let store = store();
        let user_id = Uuid::new_v4();
        let first = store
            .upsert_library_item(NewLibraryItem {
                user_id,
                network: Provider::Tiktok,
                external_id: "ext-1".into(),
                content_type: "video".into(),
                title: Some("v1".into()),
                permalink_url: None,
                media_url: None,
                thumbnail_url: None,
                posted_at: None,
                views: Some(10),
                likes: Some(1),
                raw_payload: serde_json::json!({}),
            })
            .await
            .unwrap();
        let second = store
            .upsert_library_item(NewLibraryItem {
                user_id,
                network: Provider::Tiktok,
                external_id: "ext-1".into(),
                content_type: "video".into(),
                title: Some("v1 updated".into()),
                permalink_url: None,
                media_url: None,
                thumbnail_url: None,
                posted_at: None,
                views: Some(20),
                likes: Some(2),
                raw_payload: serde_json::json!({}),
            })
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.title.as_deref(), Some("v1 updated"));
        assert_eq!(store.list_library_items(user_id, None).await.unwrap().len(), 1);
    }
}
