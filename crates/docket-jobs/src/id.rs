//! Job id generation.

use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Produces `<epoch-ms>-<random>-<counter>` ids.
///
/// The counter makes ids unique within one process even when the clock and
/// the random part collide. Share one generator per queue; tests can
/// construct their own and [`reset`](Self::reset) it.
#[derive(Debug, Default)]
pub struct JobIdGenerator {
    counter: AtomicU64,
}

impl JobIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting from `value` instead of zero.
    pub fn starting_at(value: u64) -> Self {
        Self {
            counter: AtomicU64::new(value),
        }
    }

    pub fn next_id(&self, now_ms: i64) -> String {
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);
        let salt: u32 = rand::thread_rng().r#gen();
        format!("{now_ms}-{salt}-{sequence}")
    }

    /// Number of ids handed out since creation or the last reset.
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.counter.store(0, Ordering::Relaxed);
    }
}
