//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples protocol logic from system resources
//! (time, randomness). Production code uses [`SystemEnv`](crate::SystemEnv);
//! simulations use a seeded RNG and a clock they control, so every handshake
//! and connection id in a test run is reproducible.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

use std::time::{Duration, Instant};

/// Abstract environment providing time, randomness, and async sleep.
///
/// Implementations MUST guarantee:
///
/// 1. Time monotonicity: `now()` never goes backwards
/// 2. RNG quality: `random_bytes()` uses cryptographically secure entropy in
///    production
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic time, used for timeouts and expiry.
    fn now(&self) -> Instant;

    /// Wall-clock seconds since the Unix epoch, used only for persisted
    /// timestamps (`first_seen`, `enqueued_at`).
    fn unix_time(&self) -> u64;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code sleeps; protocol logic never does.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Security
    ///
    /// Production implementations MUST use OS entropy (`getrandom`). Key
    /// material is drawn from here.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`, e.g. a connection id.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates 32 random bytes, e.g. a key seed.
    fn random_key(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        self.random_bytes(&mut bytes);
        bytes
    }
}
