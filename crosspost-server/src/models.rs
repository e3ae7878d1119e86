//! Request/response DTOs for the HTTP surface. Kept separate from
//! `crosspost_store::model`'s persisted entities (spec.md §9 redesign
//! note) following the teacher's `example-postgres` convention of
//! `CreateArticleRequest`/`UpdateArticleRequest` structs distinct from the
//! row type a service returns.

use chrono::{DateTime, Utc};
use crosspost_core::{Provider, TargetResult};
use crosspost_store::model::{JobStatus, PublishJob};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub team_id: Option<Uuid>,
    pub content: String,
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub media: Vec<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// A job view that carries both `id` and its `jobId` alias (spec.md §4.4
/// `getJob`: "includes `jobId` and its alias `id` for client convenience").
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: Uuid,
    pub job_id: Uuid,
    pub status: JobStatus,
    pub results: HashMap<String, TargetResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PublishJob> for JobView {
    fn from(job: PublishJob) -> Self {
        Self {
            id: job.id,
            job_id: job.job_id(),
            status: job.status,
            results: job.results.0,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OkEnvelope {
    pub ok: bool,
}
