//! Wire shapes sent down a user's WebSocket (spec.md §6). Every variant is
//! tagged on `type` with the exact string the client matches on.

use chrono::{DateTime, Utc};
use crosspost_core::TargetResult;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Envelope {
    /// Heartbeat, emitted roughly once a second to every active room so a
    /// client can detect a stalled connection without its own timer
    /// (spec.md §4.8).
    #[serde(rename = "clock")]
    Clock { now: DateTime<Utc> },

    #[serde(rename = "job.started")]
    JobStarted { job_id: Uuid },

    #[serde(rename = "job.completed")]
    JobCompleted {
        job_id: Uuid,
        results: HashMap<String, TargetResult>,
    },

    #[serde(rename = "job.failed")]
    JobFailed {
        job_id: Uuid,
        results: HashMap<String, TargetResult>,
        error: String,
    },

    #[serde(rename = "notification.created")]
    NotificationCreated {
        notification_id: Uuid,
        kind: String,
        message: String,
    },

    /// Sent in place of whatever messages a slow client's buffer dropped
    /// (spec.md §4.8: best-effort delivery, drop-oldest under backpressure).
    #[serde(rename = "lag")]
    Lag { dropped: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_completed_serializes_with_camel_case_job_id() {
        let env = Envelope::JobCompleted {
            job_id: Uuid::nil(),
            results: HashMap::new(),
        };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "job.completed");
        assert_eq!(json["jobId"], Uuid::nil().to_string());
    }

    #[test]
    fn clock_serializes_a_parseable_rfc3339_timestamp() {
        let now = Utc::now();
        let env = Envelope::Clock { now };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "clock");
        let parsed = DateTime::parse_from_rfc3339(json["now"].as_str().unwrap()).unwrap();
        assert_eq!(parsed.with_timezone(&Utc), now);
    }
}
