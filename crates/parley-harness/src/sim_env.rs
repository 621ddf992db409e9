//! Simulated environment.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use parley_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Unix time the simulated wall clock starts at.
const SIM_EPOCH: u64 = 1_700_000_000;

/// Deterministic environment for simulations.
///
/// Time follows tokio's clock, which turmoil controls, plus a manual skew that
/// [`advance`](Self::advance) adds to. Randomness comes from a seeded
/// `ChaCha8` shared by all clones.
#[derive(Clone)]
pub struct SimEnv {
    origin: Instant,
    skew: Arc<Mutex<Duration>>,
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SimEnv {
    /// Environment seeded with 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with a specific RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            origin: tokio::time::Instant::now().into_std(),
            skew: Arc::new(Mutex::new(Duration::ZERO)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Move this environment's clock forward.
    pub fn advance(&self, by: Duration) {
        *self.skew.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std() + *self.skew.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unix_time(&self) -> u64 {
        SIM_EPOCH + self.now().duration_since(self.origin).as_secs()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}
