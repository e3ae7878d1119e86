//! `GET /health` (spec.md §6).

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "ok": true, "now": state.clock.now() }))
}
