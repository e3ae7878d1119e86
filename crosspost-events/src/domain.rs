//! Internal domain events emitted onto the [`crate::EventBus`] by the
//! engine, scheduler, and importer. These are plain Rust values, not wire
//! shapes — `bridge::run_bridge` turns them into [`crate::Envelope`]s for
//! delivery over WebSocket, and other in-process subscribers (e.g. a
//! future notification writer) can subscribe to them directly without
//! touching JSON at all.

use crosspost_core::TargetResult;
use std::collections::HashMap;
use uuid::Uuid;

/// A publish job moved from `queued` to `running` (spec.md §4.4 step "a").
#[derive(Debug, Clone)]
pub struct JobStarted {
    pub job_id: Uuid,
    pub user_id: Uuid,
}

/// A publish job reached `succeeded` or `partial` (spec.md §4.4 step "f":
/// every target attempted and the job is not going to retry).
#[derive(Debug, Clone)]
pub struct JobCompleted {
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub results: HashMap<String, TargetResult>,
}

/// A publish job reached `failed` after exhausting its retry budget
/// (spec.md §4.4 step "g").
#[derive(Debug, Clone)]
pub struct JobFailed {
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub results: HashMap<String, TargetResult>,
    pub error: String,
}

/// A notification row was written for a user (spec.md §3 `Notification`).
#[derive(Debug, Clone)]
pub struct NotificationCreated {
    pub user_id: Uuid,
    pub notification_id: Uuid,
    pub kind: String,
    pub message: String,
}
