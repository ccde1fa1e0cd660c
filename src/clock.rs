//! Monotonic time source used by the state machines.
//!
//! The WiFi controller, the captive-portal grace window and the BLE restart
//! sequence all need "now" and "sleep". Going through a trait lets host tests
//! drive them with virtual time instead of real sleeps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Milliseconds since an arbitrary, fixed origin.
pub type Millis = u64;

/// Time source abstraction.
pub trait Clock: Send + Sync {
    /// Current monotonic time in milliseconds.
    fn now_ms(&self) -> Millis;

    /// Block the calling task for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Instant`] and [`std::thread::sleep`].
///
/// On ESP-IDF `std::thread::sleep` maps to `vTaskDelay`, so sleeping yields
/// the core to other FreeRTOS tasks.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        self.origin.elapsed().as_millis() as Millis
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock: `sleep` advances time instantly.
///
/// Cloning shares the same timeline, so a test can hold one handle while the
/// component under test owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the timeline at `ms`.
    pub fn starting_at(ms: Millis) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(ms)),
        }
    }

    /// Move time forward without sleeping.
    pub fn advance(&self, duration: Duration) {
        self.now
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// True once `now` has reached `deadline`.
pub fn deadline_reached(now: Millis, deadline: Millis) -> bool {
    now >= deadline
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_sleep_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.now_ms(), 0);
        clock.sleep(Duration::from_millis(250));
        assert_eq!(clock.now_ms(), 250);
    }

    #[test]
    fn test_manual_clock_clones_share_timeline() {
        let clock = ManualClock::starting_at(1_000);
        let other = clock.clone();
        other.advance(Duration::from_secs(3));
        assert_eq!(clock.now_ms(), 4_000);
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }

    #[test]
    fn test_deadline_reached() {
        assert!(!deadline_reached(99, 100));
        assert!(deadline_reached(100, 100));
        assert!(deadline_reached(101, 100));
    }
}
