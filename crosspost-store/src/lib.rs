//! Durable state for posts, jobs, connections, library items, and usage
//! counters (spec.md §4.1). `Store` is the trait every other component
//! programs against; `PgStore` is the only production implementation,
//! mirroring the abstract-contract/concrete-backend split the teacher uses
//! for its own data layer.

pub mod error;
pub mod model;
pub mod pg;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::StoreError;
pub use pg::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use crosspost_core::{Provider, TargetResult};
use model::{
    JobStatus, LibraryItem, NewJob, NewLibraryItem, NewNotification, NewPost, Notification, Post,
    PublishJob, QuotaResult, SocialConnection,
};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// The Store's full contract (spec.md §4.1, §4.5–§4.7). All mutation in the
/// system goes through these methods — no component queries Postgres
/// directly.
#[async_trait]
pub trait Store: Send + Sync {
    // -- Posts -----------------------------------------------------------

    async fn create_post(&self, post: NewPost) -> Result<Post, StoreError>;
    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>, StoreError>;
    async fn list_posts(&self, user_id: Uuid) -> Result<Vec<Post>, StoreError>;
    async fn delete_post(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, StoreError>;

    /// Atomically flips `status: scheduled -> publishing` for due posts and
    /// returns the claimed rows (spec.md §4.1/§4.6).
    async fn claim_due_scheduled_posts(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Post>, StoreError>;

    async fn set_post_publish_job(&self, post_id: Uuid, job_id: Uuid) -> Result<(), StoreError>;
    async fn mark_post_published(&self, post_id: Uuid, published_at: DateTime<Utc>) -> Result<(), StoreError>;
    async fn mark_post_failed(&self, post_id: Uuid, error: &str) -> Result<(), StoreError>;

    /// Revert a post whose enqueue failed validation back to `scheduled`
    /// with a backoff, or to `failed` after too many consecutive failures
    /// (spec.md §4.6 step 3).
    async fn revert_post_to_scheduled(
        &self,
        post_id: Uuid,
        backoff_until: DateTime<Utc>,
        failure_count: i32,
    ) -> Result<(), StoreError>;

    // -- Jobs --------------------------------------------------------------

    async fn insert_job(&self, job: NewJob) -> Result<PublishJob, StoreError>;
    async fn get_job(&self, job_id: Uuid) -> Result<Option<PublishJob>, StoreError>;

    /// Atomically claim the oldest `queued` job, or a `running` job whose
    /// lease has expired, FIFO by `(created_at, id)` (spec.md §4.1/§4.5).
    async fn claim_next_job(&self, worker_id: &str, lease: Duration) -> Result<Option<PublishJob>, StoreError>;

    async fn renew_lease(&self, job_id: Uuid, worker_id: &str, lease: Duration) -> Result<bool, StoreError>;

    async fn complete_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        results: HashMap<String, TargetResult>,
    ) -> Result<(), StoreError>;

    async fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
        results: HashMap<String, TargetResult>,
    ) -> Result<(), StoreError>;

    /// `queued -> canceled` directly, or `running -> canceling` for the
    /// worker to observe between attempts (spec.md §4.4 Cancellation).
    /// Returns `false` if the job was already terminal.
    async fn cancel_job(&self, job_id: Uuid, user_id: Uuid) -> Result<bool, StoreError>;

    // -- Connections & settings -------------------------------------------

    async fn get_connection(&self, user_id: Uuid, provider: Provider) -> Result<Option<SocialConnection>, StoreError>;

    /// Every user id with a stored OAuth blob under `key` (spec.md §4.7
    /// step 1: `key = provider + "_oauth"`).
    async fn list_users_with_setting(&self, key: &str) -> Result<Vec<Uuid>, StoreError>;

    // -- Library items ------------------------------------------------------

    /// Upsert keyed on `(user_id, network, external_id)` (spec.md §4.1/§4.7
    /// step 4).
    async fn upsert_library_item(&self, item: NewLibraryItem) -> Result<LibraryItem, StoreError>;
    async fn list_library_items(&self, user_id: Uuid, network: Option<Provider>) -> Result<Vec<LibraryItem>, StoreError>;
    async fn delete_library_item(&self, user_id: Uuid, item_id: Uuid) -> Result<bool, StoreError>;

    // -- Import quota --------------------------------------------------------

    /// Atomic upsert + read-back of the day's usage counter for `provider`;
    /// `ok=false` when the new total would exceed `daily_max` (`0` =
    /// unlimited) (spec.md §4.1).
    async fn consume_import_quota(
        &self,
        provider: Provider,
        day: NaiveDate,
        add: u32,
        daily_max: u32,
    ) -> Result<QuotaResult, StoreError>;

    // -- Notifications --------------------------------------------------------

    async fn create_notification(&self, notification: NewNotification) -> Result<Notification, StoreError>;
    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError>;
}
