//! Shared application state, injected into every handler via
//! `axum::extract::State` (spec.md §9: no global singletons — configuration
//! and every component are constructed once in `main` and passed down).

use crosspost_core::{Clock, IdGen};
use crosspost_engine::PublishEngine;
use crosspost_events::{EventBus, WsRooms, Envelope};
use crosspost_store::Store;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub engine: Arc<PublishEngine>,
    pub events: EventBus,
    pub ws_rooms: WsRooms<Envelope>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGen>,
    pub internal_ws_secret: String,
    pub media_root: PathBuf,
}
