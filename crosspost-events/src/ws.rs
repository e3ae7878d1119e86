//! Per-user WebSocket fan-out (spec.md §4.8). Ported from `r2e-core`'s
//! `ws` module: a broadcast channel per room backed by `tokio::sync::broadcast`,
//! with lagged receivers reported rather than silently resynced. The
//! `IsWebSocket`/`WsHandler`/`run_ws_handler` machinery that module used to
//! wire into the `r2e` macro framework's compile-time route registration is
//! dropped here — this crate hands a plain `WsBroadcaster`/`WsReceiver` pair
//! to whatever Axum handler upgrades the connection (spec.md §9 redesign
//! note: plain Axum handlers, not the macro DSL).
//!
//! Rooms are keyed by user id (spec.md: "fan-out is per userId, not
//! global") rather than by an arbitrary room name.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

const DEFAULT_ROOM_CAPACITY: usize = 256;

/// What a `WsReceiver::recv` call resolved to.
#[derive(Debug)]
pub enum RecvOutcome<T> {
    Message(T),
    /// The receiver fell behind and `n` messages were dropped before it
    /// could catch up (spec.md §4.8: "best-effort; slow consumers may miss
    /// events rather than stall the bus").
    Lagged(u64),
    Closed,
}

/// A single room's broadcaster. Cheap to clone — clones share the same
/// underlying channel.
#[derive(Clone)]
pub struct WsBroadcaster<T> {
    tx: broadcast::Sender<T>,
}

impl<T: Clone> WsBroadcaster<T> {
    fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a message to every current subscriber. Returns the number of
    /// receivers it was delivered to; `0` means the room is empty, which is
    /// not an error (spec.md: clients may not be connected when an event
    /// fires).
    pub fn send(&self, msg: T) -> usize {
        self.tx.send(msg).unwrap_or(0)
    }

    pub fn subscribe(&self) -> WsReceiver<T> {
        WsReceiver {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct WsReceiver<T> {
    rx: broadcast::Receiver<T>,
}

impl<T: Clone> WsReceiver<T> {
    pub async fn recv(&mut self) -> RecvOutcome<T> {
        match self.rx.recv().await {
            Ok(msg) => RecvOutcome::Message(msg),
            Err(broadcast::error::RecvError::Lagged(n)) => RecvOutcome::Lagged(n),
            Err(broadcast::error::RecvError::Closed) => RecvOutcome::Closed,
        }
    }
}

/// A registry of per-user broadcast rooms, created lazily on first use and
/// never explicitly torn down — an idle room with no subscribers and no
/// further sends is just a few bytes sitting in the map.
pub struct WsRooms<T> {
    rooms: Arc<DashMap<String, WsBroadcaster<T>>>,
    capacity: usize,
}

impl<T: Clone> WsRooms<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ROOM_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            capacity,
        }
    }

    /// Get or create the broadcaster for `user_id`.
    pub fn room(&self, user_id: &str) -> WsBroadcaster<T> {
        self.rooms
            .entry(user_id.to_string())
            .or_insert_with(|| WsBroadcaster::new(self.capacity))
            .clone()
    }

    /// Publish to `user_id`'s room if it exists; a no-op when nobody has
    /// ever subscribed for that user.
    pub fn send_to(&self, user_id: &str, msg: T) -> usize {
        self.rooms.get(user_id).map(|b| b.send(msg)).unwrap_or(0)
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    /// Run `f` against every room's broadcaster. Used by the clock
    /// heartbeat, which has no other reason to know which users exist.
    pub fn for_each(&self, mut f: impl FnMut(WsBroadcaster<T>)) {
        for entry in self.rooms.iter() {
            f(entry.value().clone());
        }
    }
}

impl<T: Clone> Default for WsRooms<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for WsRooms<T> {
    fn clone(&self) -> Self {
        Self {
            rooms: self.rooms.clone(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_all_subscribers_of_a_room() {
        let rooms: WsRooms<&'static str> = WsRooms::new();
        let mut a = rooms.room("user-1").subscribe();
        let mut b = rooms.room("user-1").subscribe();

        let delivered = rooms.send_to("user-1", "hello");
        assert_eq!(delivered, 2);

        assert!(matches!(a.recv().await, RecvOutcome::Message("hello")));
        assert!(matches!(b.recv().await, RecvOutcome::Message("hello")));
    }

    #[tokio::test]
    async fn send_to_unknown_room_is_a_silent_no_op() {
        let rooms: WsRooms<&'static str> = WsRooms::new();
        assert_eq!(rooms.send_to("nobody-home", "hi"), 0);
    }

    #[tokio::test]
    async fn lagging_receiver_reports_lagged_rather_than_blocking() {
        let rooms: WsRooms<u32> = WsRooms::with_capacity(2);
        let mut rx = rooms.room("user-1").subscribe();
        for i in 0..5 {
            rooms.send_to("user-1", i);
        }
        match rx.recv().await {
            RecvOutcome::Lagged(n) => assert!(n > 0),
            other => panic!("expected Lagged, got {other:?}"),
        }
    }
}
