//! Stream identifier generation.
//!
//! A stream id only has to tell concurrently active sessions of one process
//! apart; it is a correlation key, not a secret. The upper 16 bits come from
//! the wall clock (seconds), the lower 16 bits from a per-generator counter
//! XORed with a random value, so two sessions started in the same second
//! still differ.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Time source returning whole seconds.
pub type ClockFn = fn() -> u32;

/// Seconds since the Unix epoch, truncated to 32 bits.
pub fn unix_seconds() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Where the random half of each id comes from.
#[derive(Debug, Clone, Copy)]
enum Entropy {
    /// Thread-local OS-seeded generator
    Thread,
    /// Deterministic: derived from a fixed seed and the counter value
    Seeded(u64),
}

/// Generator of process-unique stream ids.
///
/// Lock-free: concurrent callers only contend on one atomic increment.
#[derive(Debug)]
pub struct StreamIdGenerator {
    counter: AtomicU32,
    entropy: Entropy,
    clock: ClockFn,
}

impl StreamIdGenerator {
    /// Generator backed by the system clock and thread-local randomness.
    pub fn new() -> Self {
        Self {
            counter: AtomicU32::new(0),
            entropy: Entropy::Thread,
            clock: unix_seconds,
        }
    }

    /// Deterministic generator for tests and replay.
    pub fn seeded(seed: u64) -> Self {
        Self {
            counter: AtomicU32::new(0),
            entropy: Entropy::Seeded(seed),
            clock: unix_seconds,
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: ClockFn) -> Self {
        self.clock = clock;
        self
    }

    /// Produce the next stream id. Never blocks, never fails.
    pub fn generate(&self) -> u32 {
        let count = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let random = match self.entropy {
            Entropy::Thread => rand::thread_rng().gen::<u32>(),
            Entropy::Seeded(seed) => {
                SmallRng::seed_from_u64(seed.wrapping_add(count as u64)).gen::<u32>()
            }
        };

        ((self.clock)() & 0xFFFF_0000) | ((random ^ count) & 0x0000_FFFF)
    }

    /// Number of ids handed out since creation or the last reset.
    pub fn issued(&self) -> u32 {
        self.counter.load(Ordering::Relaxed)
    }

    /// Restart the counter from zero.
    pub fn reset(&self) {
        self.counter.store(0, Ordering::Relaxed);
    }
}

impl Default for StreamIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
