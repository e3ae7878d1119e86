//! In-process typed event bus, ported from `r2e-events`'s `EventBus`:
//! dispatch by `TypeId`, subscribers get an `Arc<E>`, and a semaphore
//! bounds how many handlers run concurrently so a slow consumer applies
//! backpressure instead of letting memory grow unbounded.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};

type Handler = Arc<dyn Fn(Arc<dyn Any + Send + Sync>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

const DEFAULT_MAX_CONCURRENCY: usize = 1024;

/// In-process event bus with typed pub/sub and bounded concurrency.
#[derive(Clone)]
pub struct EventBus {
    handlers: Arc<RwLock<HashMap<TypeId, Vec<Handler>>>>,
    semaphore: Arc<Semaphore>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_concurrency(DEFAULT_MAX_CONCURRENCY)
    }

    pub fn with_concurrency(max_concurrent: usize) -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Subscribe to events of type `E`. The handler is invoked with an
    /// `Arc<E>` for every subsequent `emit`/`emit_and_wait` of that type.
    pub async fn subscribe<E, F, Fut>(&self, handler: F)
    where
        E: Send + Sync + 'static,
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let type_id = TypeId::of::<E>();
        let handler: Handler = Arc::new(move |any| {
            let event = any.downcast::<E>().expect("event type mismatch");
            Box::pin(handler(event))
        });
        let mut handlers = self.handlers.write().await;
        handlers.entry(type_id).or_default().push(handler);
    }

    /// Emit an event, spawning each subscriber as a task. Per-subscriber
    /// ordering for a given topic is preserved because handlers for the
    /// same `TypeId` are iterated and spawned in subscription order and
    /// each `emit` call only returns once every handler has been spawned.
    pub async fn emit<E: Send + Sync + 'static>(&self, event: E) {
        self.dispatch(event, false).await;
    }

    /// Emit an event and wait for every handler to finish running.
    pub async fn emit_and_wait<E: Send + Sync + 'static>(&self, event: E) {
        self.dispatch(event, true).await;
    }

    async fn dispatch<E: Send + Sync + 'static>(&self, event: E, wait: bool) {
        let type_id = TypeId::of::<E>();
        let event = Arc::new(event) as Arc<dyn Any + Send + Sync>;
        let handlers = self.handlers.read().await;
        let Some(subs) = handlers.get(&type_id) else {
            return;
        };
        let mut tasks = Vec::with_capacity(subs.len());
        for handler in subs {
            let h = handler.clone();
            let e = event.clone();
            let sem = self.semaphore.clone();
            let task = tokio::spawn(async move {
                let permit = sem.acquire_owned().await.expect("semaphore closed");
                h(e).await;
                drop(permit);
            });
            tasks.push(task);
        }
        if wait {
            for task in tasks {
                let _ = task.await;
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Ping(u32);

    #[tokio::test]
    async fn delivers_to_subscribers_of_the_right_type() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        bus.subscribe::<Ping, _, _>(move |p| {
            let seen = seen2.clone();
            async move {
                seen.fetch_add(p.0 as usize, Ordering::SeqCst);
            }
        })
        .await;

        bus.emit_and_wait(Ping(41)).await;
        bus.emit_and_wait(Ping(1)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[tokio::test]
    async fn events_with_no_subscriber_are_dropped_silently() {
        let bus = EventBus::new();
        bus.emit_and_wait(Ping(1)).await;
    }
}
