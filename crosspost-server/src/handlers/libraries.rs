//! `/api/social-libraries/...` — read and delete access to imported
//! `LibraryItem`s (spec.md §6). There is deliberately no create route:
//! library items are only ever written by `crosspost-importer`'s upsert
//! (spec.md §4.7 step 4), never user-authored.

use crate::models::OkEnvelope;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use crosspost_core::{AppError, Provider};
use crosspost_store::model::LibraryItem;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ListLibraryQuery {
    pub network: Option<Provider>,
}

pub async fn list_library_items(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<ListLibraryQuery>,
) -> Result<Json<Vec<LibraryItem>>, AppError> {
    let items = state
        .store
        .list_library_items(user_id, query.network)
        .await
        .map_err(AppError::from)?;
    Ok(Json(items))
}

pub async fn delete_library_item(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<OkEnvelope>, AppError> {
    let deleted = state
        .store
        .delete_library_item(user_id, item_id)
        .await
        .map_err(AppError::from)?;
    if !deleted {
        return Err(AppError::validation(format!("library item {item_id} not found")));
    }
    Ok(Json(OkEnvelope { ok: true }))
}
