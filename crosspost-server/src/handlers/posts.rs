//! CRUD on `Post` plus the publish-triggering routes that delegate straight
//! to `PublishEngine` (spec.md §6). Thin handlers: parse/validate input,
//! call one of `Store`/`PublishEngine`, map the `Result` through
//! `AppError`'s `IntoResponse`.

use crate::models::{CreatePostRequest, JobAccepted, OkEnvelope};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use crosspost_core::AppError;
use crosspost_engine::PublishRequest;
use crosspost_store::model::{NewPost, Post, PostStatus};
use uuid::Uuid;

pub async fn create_post(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(body): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    let status = match body.scheduled_for {
        Some(at) if at > state.clock.now() => PostStatus::Scheduled,
        Some(_) => return Err(AppError::validation("scheduledFor must be in the future")),
        None => PostStatus::Draft,
    };

    let post = state
        .store
        .create_post(NewPost {
            user_id,
            team_id: body.team_id,
            content: body.content,
            providers: body.providers,
            media: body.media,
            status,
            scheduled_for: body.scheduled_for,
        })
        .await
        .map_err(AppError::from)?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn list_posts(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Post>>, AppError> {
    let posts = state.store.list_posts(user_id).await.map_err(AppError::from)?;
    Ok(Json(posts))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path((user_id, post_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Post>, AppError> {
    let post = load_owned_post(&state, user_id, post_id).await?;
    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path((user_id, post_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<OkEnvelope>, AppError> {
    let deleted = state.store.delete_post(post_id, user_id).await.map_err(AppError::from)?;
    if !deleted {
        return Err(AppError::validation(format!("post {post_id} not found")));
    }
    Ok(Json(OkEnvelope { ok: true }))
}

/// `POST /api/social-posts/publish-async/user/{userId}` (spec.md §6).
pub async fn publish_async(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<PublishRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), AppError> {
    let job_id = state.engine.enqueue(user_id, request).await?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}

/// `POST /api/social-posts/publish/user/{userId}` — inline best-effort
/// publish, still returns a `jobId` for continued tracking.
pub async fn publish_inline(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<JobAccepted>, AppError> {
    let job_id = state.engine.publish_now(user_id, request).await?;
    Ok(Json(JobAccepted { job_id }))
}

/// `POST /api/posts/{postId}/publish-now/user/{userId}` — enqueues an
/// immediate publish for an existing post, built from the post's own
/// fields (the same request shape `crosspost-scheduler` builds for due
/// scheduled posts).
pub async fn publish_post_now(
    State(state): State<AppState>,
    Path((post_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<JobAccepted>, AppError> {
    let post = load_owned_post(&state, user_id, post_id).await?;

    let request = PublishRequest {
        providers: post.providers.0.clone(),
        caption: Some(post.content.clone()).filter(|c| !c.is_empty()),
        media: post.media.0.clone(),
        options: None,
        dry_run: false,
    };

    let job_id = state.engine.enqueue_for_post(user_id, post.id, request).await?;
    state.store.set_post_publish_job(post.id, job_id).await.map_err(AppError::from)?;
    Ok(Json(JobAccepted { job_id }))
}

async fn load_owned_post(state: &AppState, user_id: Uuid, post_id: Uuid) -> Result<Post, AppError> {
    let post = state
        .store
        .get_post(post_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::validation(format!("post {post_id} not found")))?;
    if post.user_id != user_id {
        return Err(AppError::validation(format!("post {post_id} not found")));
    }
    Ok(post)
}
