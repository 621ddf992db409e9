//! Production environment using system time and OS entropy.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::env::Environment;

/// Production environment.
///
/// - `std::time::Instant::now()` for monotonic time
/// - `tokio::time::sleep()` for async sleeping
/// - `getrandom` for key material and connection ids
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_time(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        if let Err(e) = getrandom::fill(buffer) {
            // NOTE: never fails on supported platforms. Keys drawn from a
            // zeroed buffer are weak, hence error level.
            tracing::error!("getrandom failed: {}", e);
            buffer.fill(0);
        }
    }
}
