//! Monotonic time source used to measure how long a deployment took.

use std::time::Duration;
use tokio::time::Instant;

/// A point on a monotonic clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(Instant);

impl Timestamp {
    pub fn from_instant(instant: Instant) -> Self {
        Self(instant)
    }

    /// Time elapsed from `earlier` to `self`, or `None` if `earlier` is later.
    pub fn since(&self, earlier: Timestamp) -> Option<Duration> {
        self.0.checked_duration_since(earlier.0)
    }
}

/// Source of timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Clock backed by `tokio::time::Instant`.
///
/// Under `tokio::time::pause` this clock follows the runtime's virtual time,
/// which is what the deployment tests rely on.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        Timestamp(Instant::now())
    }
}
