//! FIFO request throttle.
//!
//! Callers take a slot in arrival order and sleep until it comes up, so a
//! burst is spread out at the configured rate instead of being rejected.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::store::lock;

#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    /// Allows at most `per_second` acquisitions per second. Zero disables throttling.
    pub fn per_second(per_second: u32) -> Self {
        let interval = if per_second == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / per_second
        };
        Self::with_interval(interval)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Blocks until the caller's slot is reached.
    pub fn acquire(&self) {
        let slot = self.reserve(Instant::now());
        let now = Instant::now();
        if slot > now {
            let wait = slot - now;
            debug!(wait_ms = wait.as_millis() as u64, "throttle wait");
            thread::sleep(wait);
        }
    }

    /// Claims the next free slot at or after `now`.
    ///
    /// Slots follow lock acquisition order, and `std::sync::Mutex` is not
    /// fair, so concurrent callers are only roughly first come first served.
    fn reserve(&self, now: Instant) -> Instant {
        let mut next = lock(&self.next_slot);
        let slot = match *next {
            Some(at) if at > now => at,
            _ => now,
        };
        *next = Some(slot + self.interval);
        slot
    }
}
