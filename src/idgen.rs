//! Injectable id generation for sync group ids.

use std::sync::atomic::{AtomicU64, Ordering};

/// A source of freshly generated, UUID-shaped unique identifiers.
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> String;
}

/// Production id generator backed by UUID v4.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn new_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Deterministic id generator for tests: hands out `prefix-0`, `prefix-1`, ...
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        SequentialIdGenerator {
            prefix: prefix.into(),
            next: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn new_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_generator_increments() {
        let gen = SequentialIdGenerator::new("group");
        assert_eq!(gen.new_id(), "group-0");
        assert_eq!(gen.new_id(), "group-1");
        assert_eq!(gen.new_id(), "group-2");
    }

    #[test]
    fn uuid_generator_produces_unique_ids() {
        let gen = UuidGenerator;
        let a = gen.new_id();
        let b = gen.new_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
