//! Bridges the internal [`EventBus`] to per-user WebSocket rooms (spec.md
//! §4.8). `run_bridge` is spawned once at startup: it subscribes to every
//! domain event type and forwards each as an [`Envelope`] into the
//! originating user's room, and separately ticks a `clock` heartbeat into
//! every room that currently has a subscriber.

use crate::domain::{JobCompleted, JobFailed, JobStarted, NotificationCreated};
use crate::envelope::Envelope;
use crate::{EventBus, WsRooms};
use crosspost_core::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Wire the bus to `rooms` and run the clock heartbeat until `cancel` fires.
/// Intended to be spawned as its own task at process startup, alongside the
/// engine/scheduler/importer loops (spec.md §5).
pub async fn run_bridge(bus: EventBus, rooms: WsRooms<Envelope>, clock: Arc<dyn Clock>, cancel: CancellationToken) {
    subscribe_job_events(&bus, rooms.clone()).await;
    subscribe_notification_events(&bus, rooms.clone()).await;
    run_heartbeat(rooms, clock, cancel).await;
}

async fn subscribe_job_events(bus: &EventBus, rooms: WsRooms<Envelope>) {
    let r = rooms.clone();
    bus.subscribe::<JobStarted, _, _>(move |event| {
        let rooms = r.clone();
        async move {
            rooms.send_to(
                &event.user_id.to_string(),
                Envelope::JobStarted { job_id: event.job_id },
            );
        }
    })
    .await;

    let r = rooms.clone();
    bus.subscribe::<JobCompleted, _, _>(move |event| {
        let rooms = r.clone();
        async move {
            rooms.send_to(
                &event.user_id.to_string(),
                Envelope::JobCompleted {
                    job_id: event.job_id,
                    results: event.results.clone(),
                },
            );
        }
    })
    .await;

    let r = rooms.clone();
    bus.subscribe::<JobFailed, _, _>(move |event| {
        let rooms = r.clone();
        async move {
            rooms.send_to(
                &event.user_id.to_string(),
                Envelope::JobFailed {
                    job_id: event.job_id,
                    results: event.results.clone(),
                    error: event.error.clone(),
                },
            );
        }
    })
    .await;
}

async fn subscribe_notification_events(bus: &EventBus, rooms: WsRooms<Envelope>) {
    bus.subscribe::<NotificationCreated, _, _>(move |event| {
        let rooms = rooms.clone();
        async move {
            rooms.send_to(
                &event.user_id.to_string(),
                Envelope::NotificationCreated {
                    notification_id: event.notification_id,
                    kind: event.kind.clone(),
                    message: event.message.clone(),
                },
            );
        }
    })
    .await;
}

async fn run_heartbeat(rooms: WsRooms<Envelope>, clock: Arc<dyn Clock>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = clock.now();
                // `rooms` has no "list all keys" beyond active_rooms/len, so
                // instead of iterating we publish by getting-or-creating each
                // room is wasteful; WsRooms exposes room ids via its DashMap
                // directly for this one internal use.
                for_each_room(&rooms, |broadcaster| {
                    broadcaster.send(Envelope::Clock { now });
                });
            }
            _ = cancel.cancelled() => return,
        }
    }
}

fn for_each_room(rooms: &WsRooms<Envelope>, mut f: impl FnMut(crate::WsBroadcaster<Envelope>)) {
    rooms.for_each(|broadcaster| f(broadcaster));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosspost_core::clock::FixedClock;
    use uuid::Uuid;

    #[tokio::test]
    async fn job_started_is_forwarded_to_the_right_users_room() {
        let bus = EventBus::new();
        let rooms: WsRooms<Envelope> = WsRooms::new();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(chrono::Utc::now()));
        let cancel = CancellationToken::new();

        subscribe_job_events(&bus, rooms.clone()).await;

        let user_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let mut rx = rooms.room(&user_id.to_string()).subscribe();

        bus.emit_and_wait(JobStarted { job_id, user_id }).await;

        match rx.recv().await {
            crate::ws::RecvOutcome::Message(Envelope::JobStarted { job_id: got }) => {
                assert_eq!(got, job_id);
            }
            other => panic!("unexpected: {other:?}"),
        }
        cancel.cancel();
    }
}
