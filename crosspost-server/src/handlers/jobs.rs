//! `GET /api/social-posts/publish-jobs/{jobId}` (spec.md §6).

use crate::models::JobView;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use crosspost_core::AppError;
use uuid::Uuid;

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobView>, AppError> {
    let job = state.engine.get_job(job_id).await?;
    Ok(Json(job.into()))
}
