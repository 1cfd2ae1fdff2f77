//! Time source for capture timestamps

use std::time::Instant;

/// Millisecond clock stamped into frame headers at capture time
///
/// Called from the bit path, so implementations must not block.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send {
    /// Milliseconds since an arbitrary epoch; wraps at `u32::MAX`
    fn now_ms(&self) -> u32;
}

/// Milliseconds since construction
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u32 {
        // Truncation gives the wrap-around
        self.start.elapsed().as_millis() as u32
    }
}
