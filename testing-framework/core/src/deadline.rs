use std::{sync::Arc, time::Duration};

use tracing::warn;

use crate::clock::Clock;

/// Shrinks one request budget across the phases of that request.
#[derive(Clone)]
pub struct DeadlineTracker {
    floor: Duration,
    clock: Arc<dyn Clock>,
}

impl DeadlineTracker {
    #[must_use]
    pub fn new(floor: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { floor, clock }
    }

    #[must_use]
    pub const fn floor(&self) -> Duration {
        self.floor
    }

    /// Budget left of `original` since `start_ms`, never below the floor.
    #[must_use]
    pub fn remaining(&self, start_ms: u64, original: Duration) -> Duration {
        remaining_budget(start_ms, original, self.clock.now_ms(), self.floor)
    }
}

/// `original - (now - start)`, replaced by `floor` when smaller.
#[must_use]
pub fn remaining_budget(start_ms: u64, original: Duration, now_ms: u64, floor: Duration) -> Duration {
    let elapsed = Duration::from_millis(now_ms.saturating_sub(start_ms));
    match original.checked_sub(elapsed) {
        Some(left) if left >= floor => left,
        _ => {
            warn!(
                floor_ms = floor.as_millis() as u64,
                "timeout is too small, using the minimal phase timeout instead"
            );
            floor
        }
    }
}
