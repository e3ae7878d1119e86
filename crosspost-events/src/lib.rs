//! Realtime event fan-out (spec.md §4.8): an in-process typed pub/sub
//! (`bus`) that the engine/scheduler/importer emit domain events onto, and
//! a per-user WebSocket broadcaster (`ws`) that a bridge task feeds from
//! the bus. `envelope` defines the exact JSON shapes clients see.

pub mod bridge;
pub mod bus;
pub mod domain;
pub mod envelope;
pub mod ws;

pub use bridge::run_bridge;
pub use bus::EventBus;
pub use domain::{JobCompleted, JobFailed, JobStarted, NotificationCreated};
pub use envelope::Envelope;
pub use ws::{WsBroadcaster, WsRooms};
