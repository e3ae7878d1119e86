//! `GET /api/events/ws?userId=...` (spec.md §4.8/§6). Reachable only via an
//! internal secret header injected by the trusted proxy, or from the
//! loopback interface — the backend never authenticates the browser
//! itself, it trusts the proxy's `userId` query parameter once the secret
//! (or loopback origin) checks out.

use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use crosspost_core::{AppError, ErrorKind};
use crosspost_events::ws::RecvOutcome;
use serde::Deserialize;
use std::net::SocketAddr;

const INTERNAL_SECRET_HEADER: &str = "x-internal-ws-secret";

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(rename = "userId")]
    pub user_id: String,
}

pub async fn ws_events(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    authorize(&state, &headers, peer)?;
    let user_id = query.user_id;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

fn authorize(state: &AppState, headers: &HeaderMap, peer: SocketAddr) -> Result<(), AppError> {
    if peer.ip().is_loopback() {
        return Ok(());
    }
    if state.internal_ws_secret.is_empty() {
        return Err(AppError::new(ErrorKind::Internal, "INTERNAL_WS_SECRET is not configured"));
    }
    let presented = headers
        .get(INTERNAL_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if presented == state.internal_ws_secret {
        Ok(())
    } else {
        Err(AppError::new(ErrorKind::ValidationFailed, "missing or invalid internal ws secret"))
    }
}

async fn handle_socket(mut socket: WebSocket, state: AppState, user_id: String) {
    let mut receiver = state.ws_rooms.room(&user_id).subscribe();
    loop {
        tokio::select! {
            outcome = receiver.recv() => {
                let envelope = match outcome {
                    RecvOutcome::Message(envelope) => envelope,
                    RecvOutcome::Lagged(dropped) => crosspost_events::Envelope::Lag { dropped },
                    RecvOutcome::Closed => return,
                };
                let Ok(text) = serde_json::to_string(&envelope) else { continue };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    return;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Err(_)) => return,
                    _ => continue,
                }
            }
        }
    }
}
