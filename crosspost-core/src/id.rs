//! Injected id generation. Collision-resistant 128-bit identifiers,
//! rendered as UUIDs end to end (wire JSON sees plain strings via serde).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// A source of fresh, collision-resistant ids.
pub trait IdGen: Send + Sync + 'static {
    fn new_id(&self) -> Uuid;
}

/// The real generator: UUIDv7 (time-ordered, so ids sort roughly with
/// `createdAt` — handy for the `(createdAt, jobId)` FIFO tie-break in
/// spec.md's JobQueue semantics).
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV7Gen;

impl IdGen for UuidV7Gen {
    fn new_id(&self) -> Uuid {
        Uuid::now_v7()
    }
}

/// Build the production id generator.
pub fn system() -> Arc<dyn IdGen> {
    Arc::new(UuidV7Gen)
}

/// A deterministic generator for tests: ids are `Uuid`s built from an
/// incrementing counter, so assertions can name an id ahead of time.
#[derive(Debug, Default)]
pub struct SequentialIdGen {
    next: AtomicU64,
}

impl SequentialIdGen {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGen for SequentialIdGen {
    fn new_id(&self) -> Uuid {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        Uuid::from_u128(n as u128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_id_gen_is_deterministic_and_unique() {
        let gen = SequentialIdGen::new();
        let a = gen.new_id();
        let b = gen.new_id();
        assert_ne!(a, b);
        assert_eq!(a, Uuid::from_u128(0));
        assert_eq!(b, Uuid::from_u128(1));
    }
}
