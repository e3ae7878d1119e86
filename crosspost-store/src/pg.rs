//! Postgres-backed `Store` (spec.md §4.1). Queries are written against the
//! runtime `sqlx::query`/`query_as` API rather than the `query!` compile-time
//! macros, since those macros need a live `DATABASE_URL` at build time.
//!
//! Atomic claims (`claim_due_scheduled_posts`, `claim_next_job`,
//! `consume_import_quota`) are each a single `UPDATE ... RETURNING` or
//! `INSERT ... ON CONFLICT ... RETURNING` statement, so Postgres's
//! statement-level atomicity is enough without an explicit transaction.

use crate::error::StoreError;
use crate::model::*;
use crate::Store;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use crosspost_core::{Provider, TargetResult};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// The production `Store`. Cheap to clone — `PgPool` is itself a handle
/// around a connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run pending migrations (spec.md §6 exit codes: a failed migration is
    /// a fatal startup error).
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Permanent(e.to_string()))
    }
}

fn provider_of(row: &PgRow, col: &str) -> Result<Provider, StoreError> {
    let raw: String = row.try_get(col).map_err(StoreError::from)?;
    Provider::from_str(&raw).map_err(|e| StoreError::Permanent(e.to_string()))
}

fn post_of(row: PgRow) -> Result<Post, StoreError> {
    let providers: Json<Vec<Provider>> = row.try_get("providers").map_err(StoreError::from)?;
    let media: Json<Vec<String>> = row.try_get("media").map_err(StoreError::from)?;
    Ok(Post {
        id: row.try_get("id").map_err(StoreError::from)?,
        user_id: row.try_get("user_id").map_err(StoreError::from)?,
        team_id: row.try_get("team_id").map_err(StoreError::from)?,
        content: row.try_get("content").map_err(StoreError::from)?,
        providers,
        media,
        status: row.try_get("status").map_err(StoreError::from)?,
        scheduled_for: row.try_get("scheduled_for").map_err(StoreError::from)?,
        published_at: row.try_get("published_at").map_err(StoreError::from)?,
        last_publish_job_id: row.try_get("last_publish_job_id").map_err(StoreError::from)?,
        last_publish_error: row.try_get("last_publish_error").map_err(StoreError::from)?,
        failure_count: row.try_get("failure_count").map_err(StoreError::from)?,
        created_at: row.try_get("created_at").map_err(StoreError::from)?,
        updated_at: row.try_get("updated_at").map_err(StoreError::from)?,
    })
}

fn job_of(row: PgRow) -> Result<PublishJob, StoreError> {
    let request: Json<PublishRequest> = row.try_get("request").map_err(StoreError::from)?;
    let results: Json<HashMap<String, TargetResult>> = row.try_get("results").map_err(StoreError::from)?;
    Ok(PublishJob {
        id: row.try_get("id").map_err(StoreError::from)?,
        user_id: row.try_get("user_id").map_err(StoreError::from)?,
        post_id: row.try_get("post_id").map_err(StoreError::from)?,
        status: row.try_get("status").map_err(StoreError::from)?,
        request,
        results,
        worker_id: row.try_get("worker_id").map_err(StoreError::from)?,
        lease_expires_at: row.try_get("lease_expires_at").map_err(StoreError::from)?,
        created_at: row.try_get("created_at").map_err(StoreError::from)?,
        updated_at: row.try_get("updated_at").map_err(StoreError::from)?,
    })
}

fn library_item_of(row: PgRow) -> Result<LibraryItem, StoreError> {
    let raw_payload: Json<serde_json::Value> = row.try_get("raw_payload").map_err(StoreError::from)?;
    Ok(LibraryItem {
        id: row.try_get("id").map_err(StoreError::from)?,
        user_id: row.try_get("user_id").map_err(StoreError::from)?,
        network: provider_of(&row, "network")?,
        external_id: row.try_get("external_id").map_err(StoreError::from)?,
        content_type: row.try_get("content_type").map_err(StoreError::from)?,
        title: row.try_get("title").map_err(StoreError::from)?,
        permalink_url: row.try_get("permalink_url").map_err(StoreError::from)?,
        media_url: row.try_get("media_url").map_err(StoreError::from)?,
        thumbnail_url: row.try_get("thumbnail_url").map_err(StoreError::from)?,
        posted_at: row.try_get("posted_at").map_err(StoreError::from)?,
        views: row.try_get("views").map_err(StoreError::from)?,
        likes: row.try_get("likes").map_err(StoreError::from)?,
        raw_payload,
        created_at: row.try_get("created_at").map_err(StoreError::from)?,
        updated_at: row.try_get("updated_at").map_err(StoreError::from)?,
    })
}

fn connection_of(row: PgRow) -> Result<SocialConnection, StoreError> {
    let credentials: Json<serde_json::Value> = row.try_get("credentials").map_err(StoreError::from)?;
    Ok(SocialConnection {
        user_id: row.try_get("user_id").map_err(StoreError::from)?,
        provider: provider_of(&row, "provider")?,
        provider_account_id: row.try_get("provider_account_id").map_err(StoreError::from)?,
        credentials,
        expires_at: row.try_get("expires_at").map_err(StoreError::from)?,
        created_at: row.try_get("created_at").map_err(StoreError::from)?,
        updated_at: row.try_get("updated_at").map_err(StoreError::from)?,
    })
}

fn notification_of(row: PgRow) -> Result<Notification, StoreError> {
    Ok(Notification {
        id: row.try_get("id").map_err(StoreError::from)?,
        user_id: row.try_get("user_id").map_err(StoreError::from)?,
        kind: row.try_get("kind").map_err(StoreError::from)?,
        message: row.try_get("message").map_err(StoreError::from)?,
        is_read: row.try_get("is_read").map_err(StoreError::from)?,
        created_at: row.try_get("created_at").map_err(StoreError::from)?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn create_post(&self, post: NewPost) -> Result<Post, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO posts (id, user_id, team_id, content, providers, media, status, scheduled_for, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now(), now())
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(post.user_id)
        .bind(post.team_id)
        .bind(&post.content)
        .bind(Json(&post.providers))
        .bind(Json(&post.media))
        .bind(post.status)
        .bind(post.scheduled_for)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;
        post_of(row)
    }

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>, StoreError> {
        let row = sqlx::query("SELECT * FROM posts WHERE id = $1")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        row.map(post_of).transpose()
    }

    async fn list_posts(&self, user_id: Uuid) -> Result<Vec<Post>, StoreError> {
        let rows = sqlx::query("SELECT * FROM posts WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;
        rows.into_iter().map(post_of).collect()
    }

    async fn delete_post(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn claim_due_scheduled_posts(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Post>, StoreError> {
        let rows = sqlx::query(
            r#"
            UPDATE posts SET status = 'publishing', updated_at = now()
            WHERE id IN (
                SELECT id FROM posts
                WHERE status = 'scheduled' AND scheduled_for <= $1
                ORDER BY scheduled_for, id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;
        rows.into_iter().map(post_of).collect()
    }

    async fn set_post_publish_job(&self, post_id: Uuid, job_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE posts SET last_publish_job_id = $2, updated_at = now() WHERE id = $1")
            .bind(post_id)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn mark_post_published(&self, post_id: Uuid, published_at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE posts SET status = 'published', published_at = $2, updated_at = now() WHERE id = $1",
        )
        .bind(post_id)
        .bind(published_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn mark_post_failed(&self, post_id: Uuid, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE posts SET status = 'failed', last_publish_error = $2, updated_at = now() WHERE id = $1",
        )
        .bind(post_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn revert_post_to_scheduled(
        &self,
        post_id: Uuid,
        backoff_until: DateTime<Utc>,
        failure_count: i32,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE posts
            SET status = 'scheduled', scheduled_for = $2, failure_count = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(post_id)
        .bind(backoff_until)
        .bind(failure_count)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn insert_job(&self, job: NewJob) -> Result<PublishJob, StoreError> {
        let results: HashMap<String, TargetResult> = HashMap::new();
        let row = sqlx::query(
            r#"
            INSERT INTO publish_jobs (id, user_id, post_id, status, request, results, created_at, updated_at)
            VALUES ($1, $2, $3, 'queued', $4, $5, now(), now())
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(job.user_id)
        .bind(job.post_id)
        .bind(Json(&job.request))
        .bind(Json(&results))
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;
        job_of(row)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<PublishJob>, StoreError> {
        let row = sqlx::query("SELECT * FROM publish_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        row.map(job_of).transpose()
    }

    async fn claim_next_job(&self, worker_id: &str, lease: Duration) -> Result<Option<PublishJob>, StoreError> {
        let lease_seconds = lease.as_secs() as f64;
        let row = sqlx::query(
            r#"
            UPDATE publish_jobs SET
                status = 'running',
                worker_id = $1,
                lease_expires_at = now() + ($2 || ' seconds')::interval,
                updated_at = now()
            WHERE id = (
                SELECT id FROM publish_jobs
                WHERE status = 'queued'
                   OR (status = 'running' AND lease_expires_at <= now())
                ORDER BY created_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .bind(lease_seconds.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        row.map(job_of).transpose()
    }

    async fn renew_lease(&self, job_id: Uuid, worker_id: &str, lease: Duration) -> Result<bool, StoreError> {
        let lease_seconds = lease.as_secs() as f64;
        let result = sqlx::query(
            r#"
            UPDATE publish_jobs
            SET lease_expires_at = now() + ($3 || ' seconds')::interval, updated_at = now()
            WHERE id = $1 AND worker_id = $2 AND status IN ('running', 'canceling')
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(lease_seconds.to_string())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        results: HashMap<String, TargetResult>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE publish_jobs
            SET status = $2, results = $3, lease_expires_at = NULL, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(status)
        .bind(Json(&results))
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn fail_job(
        &self,
        job_id: Uuid,
        _error: &str,
        results: HashMap<String, TargetResult>,
    ) -> Result<(), StoreError> {
        self.complete_job(job_id, JobStatus::Failed, results).await
    }

    async fn cancel_job(&self, job_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE publish_jobs
            SET status = CASE WHEN status = 'queued' THEN 'canceled' ELSE 'canceling' END,
                updated_at = now()
            WHERE id = $1 AND user_id = $2 AND status IN ('queued', 'running')
            "#,
        )
        .bind(job_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_connection(&self, user_id: Uuid, provider: Provider) -> Result<Option<SocialConnection>, StoreError> {
        let row = sqlx::query("SELECT * FROM social_connections WHERE user_id = $1 AND provider = $2")
            .bind(user_id)
            .bind(provider.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        row.map(connection_of).transpose()
    }

    async fn list_users_with_setting(&self, key: &str) -> Result<Vec<Uuid>, StoreError> {
        let rows = sqlx::query("SELECT user_id FROM user_settings WHERE key = $1")
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;
        rows.into_iter()
            .map(|row| row.try_get("user_id").map_err(StoreError::from))
            .collect()
    }

    async fn upsert_library_item(&self, item: NewLibraryItem) -> Result<LibraryItem, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO library_items (
                id, user_id, network, external_id, content_type, title, permalink_url,
                media_url, thumbnail_url, posted_at, views, likes, raw_payload, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, now(), now())
            ON CONFLICT (user_id, network, external_id) DO UPDATE SET
                title = EXCLUDED.title,
                permalink_url = EXCLUDED.permalink_url,
                media_url = EXCLUDED.media_url,
                thumbnail_url = EXCLUDED.thumbnail_url,
                posted_at = EXCLUDED.posted_at,
                views = EXCLUDED.views,
                likes = EXCLUDED.likes,
                raw_payload = EXCLUDED.raw_payload,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(item.user_id)
        .bind(item.network.as_str())
        .bind(&item.external_id)
        .bind(&item.content_type)
        .bind(&item.title)
        .bind(&item.permalink_url)
        .bind(&item.media_url)
        .bind(&item.thumbnail_url)
        .bind(item.posted_at)
        .bind(item.views)
        .bind(item.likes)
        .bind(Json(&item.raw_payload))
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;
        library_item_of(row)
    }

    async fn list_library_items(&self, user_id: Uuid, network: Option<Provider>) -> Result<Vec<LibraryItem>, StoreError> {
        let rows = match network {
            Some(provider) => {
                sqlx::query("SELECT * FROM library_items WHERE user_id = $1 AND network = $2 ORDER BY posted_at DESC NULLS LAST")
                    .bind(user_id)
                    .bind(provider.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM library_items WHERE user_id = $1 ORDER BY posted_at DESC NULLS LAST")
                    .bind(user_id)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(StoreError::from)?;
        rows.into_iter().map(library_item_of).collect()
    }

    async fn delete_library_item(&self, user_id: Uuid, item_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM library_items WHERE id = $1 AND user_id = $2")
            .bind(item_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn consume_import_quota(
        &self,
        provider: Provider,
        day: NaiveDate,
        add: u32,
        daily_max: u32,
    ) -> Result<QuotaResult, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO import_usage (provider, day, requests_used)
            VALUES ($1, $2, $3)
            ON CONFLICT (provider, day) DO UPDATE SET requests_used = import_usage.requests_used + $3
            RETURNING requests_used
            "#,
        )
        .bind(provider.as_str())
        .bind(day)
        .bind(add as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;
        let used: i32 = row.try_get("requests_used").map_err(StoreError::from)?;
        let used = used as u32;
        let ok = daily_max == 0 || used <= daily_max;
        Ok(QuotaResult { ok, used })
    }

    async fn create_notification(&self, notification: NewNotification) -> Result<Notification, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, kind, message, is_read, created_at)
            VALUES ($1, $2, $3, $4, false, now())
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(notification.user_id)
        .bind(&notification.kind)
        .bind(&notification.message)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;
        notification_of(row)
    }

    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query("SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;
        rows.into_iter().map(notification_of).collect()
    }
}
