//! Reconnect backoff with jitter.
//!
//! Delay doubles after each failure from `base` up to `cap`, with a random
//! spread of `jitter_percent` around the nominal value. Consecutive delays
//! never decrease and never exceed the cap.

use super::WifiTimings;
use std::time::Duration;

/// Exponential backoff state.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: u64,
    cap_ms: u64,
    jitter_percent: u8,
    /// Nominal delay for the next failure.
    nominal_ms: u64,
    /// Last delay handed out since the last reset.
    last_ms: u64,
    failures: u32,
    /// Simple LCG PRNG state for jitter.
    rng_state: u32,
}

impl Backoff {
    pub fn new(timings: &WifiTimings) -> Self {
        let base_ms = timings.backoff_base.as_millis() as u64;
        Self {
            base_ms,
            cap_ms: (timings.backoff_cap.as_millis() as u64).max(base_ms),
            jitter_percent: timings.jitter_percent.min(99),
            nominal_ms: base_ms,
            last_ms: 0,
            failures: 0,
            rng_state: 0x12345678,
        }
    }

    /// Seed the jitter generator.
    ///
    /// On ESP32, use hardware RNG for the seed. For testing, use a fixed seed.
    pub fn seed(&mut self, seed: u32) {
        // Ensure non-zero state
        self.rng_state = if seed == 0 { 1 } else { seed };
    }

    /// Seed from the OS entropy source.
    pub fn seed_from_os(&mut self) {
        use rand_core::{OsRng, RngCore};
        self.seed(OsRng.next_u32());
    }

    /// Record a failure and return how long to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let jittered = self.apply_jitter(self.nominal_ms);
        let delay = jittered.max(self.last_ms).min(self.cap_ms);

        self.last_ms = delay;
        self.failures = self.failures.saturating_add(1);
        self.nominal_ms = self.nominal_ms.saturating_mul(2).min(self.cap_ms);
        Duration::from_millis(delay)
    }

    /// Back to the base delay after a successful connection.
    pub fn reset(&mut self) {
        self.nominal_ms = self.base_ms;
        self.last_ms = 0;
        self.failures = 0;
    }

    /// Failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    fn apply_jitter(&mut self, nominal_ms: u64) -> u64 {
        let spread = nominal_ms * self.jitter_percent as u64 / 100;
        if spread == 0 {
            return nominal_ms;
        }
        // Uniform in [nominal - spread, nominal + spread]
        let offset = self.next_random() as u64 % (2 * spread + 1);
        nominal_ms - spread + offset
    }

    /// Simple LCG random number generator.
    ///
    /// Parameters from Numerical Recipes (good enough for backoff jitter).
    fn next_random(&mut self) -> u32 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(1664525)
            .wrapping_add(1013904223);
        self.rng_state
    }
}
