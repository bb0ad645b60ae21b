use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use serde::Serialize;

/// Consecutive failures tolerated before the daemon reports itself down
pub const MAX_TOLERATED_FAILURES: u32 = 2;

/// Snapshot served by the liveness endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub num_failures: u32,
    pub down: bool,
}

/// Process-wide consecutive-failure counter.
///
/// Written only by the reconciler; readers never block a running cycle.
#[derive(Debug, Clone, Default)]
pub struct HealthReporter {
    failures: Arc<AtomicU32>,
}

impl HealthReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new failure count
    pub fn record_failure(&self) -> u32 {
        self.failures.fetch_add(1, Ordering::Relaxed).saturating_add(1)
    }

    pub fn reset(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    pub fn num_failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn is_healthy(&self) -> bool {
        self.num_failures() <= MAX_TOLERATED_FAILURES
    }

    pub fn status(&self) -> HealthStatus {
        let num_failures = self.num_failures();
        HealthStatus {
            num_failures,
            down: num_failures > MAX_TOLERATED_FAILURES,
        }
    }
}
