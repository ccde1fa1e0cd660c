//! On-device test harness with TAP output.
//!
//! Only compiled with the `tap-tests` feature. Tests live in `tap_tests`
//! modules next to the code they exercise and are collected through
//! `inventory`, so the `device-tests` binary can run them on the ESP32 (or
//! the host) and print results over the console UART:
//!
//! ```ignore
//! #[cfg(feature = "tap-tests")]
//! mod tap_tests {
//!     use super::*;
//!     use ble_hid_bridge_macros::tap_test;
//!
//!     #[tap_test]
//!     fn nvs_round_trip() -> ble_hid_bridge::testing::TestResult {
//!         let mut store = NvsStore::open_default()?;
//!         store.set_u8("tap_test", "mode", 1)?;
//!         Ok(())
//!     }
//! }
//! ```
//!
//! Host-only behaviour is covered by the ordinary `#[cfg(test)]` suites;
//! these are for things that need the real flash, radio or scheduler.

use std::panic::{catch_unwind, AssertUnwindSafe};

pub use inventory;

pub type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub type TestRegisterFn = fn(&mut TestRunner);

/// One `#[tap_test]`, registered at link time.
pub struct TapTestEntry {
    pub name: &'static str,
    pub register: TestRegisterFn,
}

impl TapTestEntry {
    pub const fn new(name: &'static str, register: TestRegisterFn) -> Self {
        Self { name, register }
    }
}

inventory::collect!(TapTestEntry);

pub fn test_count() -> usize {
    inventory::iter::<TapTestEntry>.into_iter().count()
}

/// Run every registered test. Returns true if all passed.
pub fn run_all_tests() -> bool {
    let mut runner = TestRunner::new();
    runner.print_header(test_count());
    for entry in inventory::iter::<TapTestEntry> {
        (entry.register)(&mut runner);
    }
    runner.finish()
}

#[derive(Debug, Default)]
pub struct TestRunner {
    tests_run: usize,
    tests_passed: usize,
    tests_failed: usize,
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl TestRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn pass(&mut self, name: &str) {
        self.tests_passed += 1;
        println!("ok {} - {}", self.tests_run, name);
    }

    fn fail(&mut self, name: &str, diagnostic: &str) {
        self.tests_failed += 1;
        println!("not ok {} - {}", self.tests_run, name);
        println!("# {}", diagnostic);
    }

    /// Run a fallible test. Errors and panics both count as failures.
    pub fn run<F>(&mut self, name: &str, test_fn: F)
    where
        F: FnOnce() -> TestResult + std::panic::UnwindSafe,
    {
        self.tests_run += 1;
        match catch_unwind(AssertUnwindSafe(test_fn)) {
            Ok(Ok(())) => self.pass(name),
            Ok(Err(e)) => self.fail(name, &format!("Error: {}", e)),
            Err(payload) => self.fail(name, &format!("Panic: {}", panic_message(&payload))),
        }
    }

    /// Run a test that signals failure by panicking.
    pub fn run_assert<F>(&mut self, name: &str, test_fn: F)
    where
        F: FnOnce() + std::panic::UnwindSafe,
    {
        self.run(name, || {
            test_fn();
            Ok(())
        });
    }

    /// Run a test that must panic, optionally with a message containing
    /// `expected`.
    pub fn run_should_panic<F>(&mut self, name: &str, test_fn: F, expected: Option<&str>)
    where
        F: FnOnce() + std::panic::UnwindSafe,
    {
        self.tests_run += 1;
        match catch_unwind(AssertUnwindSafe(test_fn)) {
            Ok(()) => self.fail(name, "Expected panic but test completed normally"),
            Err(payload) => {
                let msg = panic_message(&payload);
                match expected {
                    Some(want) if !msg.contains(want) => self.fail(
                        name,
                        &format!("Expected panic containing '{}', got '{}'", want, msg),
                    ),
                    _ => self.pass(name),
                }
            }
        }
    }

    pub fn print_header(&self, planned_tests: usize) {
        println!("TAP version 14");
        println!("1..{}", planned_tests);
    }

    pub fn comment(msg: &str) {
        println!("# {}", msg);
    }

    /// Print the summary. Returns true if nothing failed.
    pub fn finish(&self) -> bool {
        println!("# -----------------------");
        println!("# Tests run: {}", self.tests_run);
        println!("# Passed: {}", self.tests_passed);
        println!("# Failed: {}", self.tests_failed);
        let pass = self.tests_failed == 0;
        println!("# Result: {}", if pass { "PASS" } else { "FAIL" });
        pass
    }

    pub fn tests_run(&self) -> usize {
        self.tests_run
    }

    pub fn tests_passed(&self) -> usize {
        self.tests_passed
    }

    pub fn tests_failed(&self) -> usize {
        self.tests_failed
    }
}

mod tap_tests {
    use super::*;
    use crate::ble::{HidCall, HidDevice, LoggingHid};
    use crate::clock::{Clock, SystemClock};
    use crate::dispatch::CommandDispatcher;
    use crate::status;
    use ble_hid_bridge_macros::tap_test;
    use std::sync::Arc;
    use std::time::Duration;

    #[tap_test]
    fn runner_counts_results() {
        let mut runner = TestRunner::new();
        runner.run("pass", || Ok(()));
        runner.run("fail", || Err("error".into()));
        runner.run_assert("panic", || panic!("intentional"));
        assert_eq!(runner.tests_run(), 3);
        assert_eq!(runner.tests_passed(), 1);
        assert_eq!(runner.tests_failed(), 2);
    }

    #[tap_test]
    fn runner_checks_expected_panic_message() {
        let mut runner = TestRunner::new();
        runner.run_should_panic("matches", || panic!("queue full"), Some("full"));
        runner.run_should_panic("mismatch", || panic!("queue full"), Some("empty"));
        runner.run_should_panic("no panic", || {}, None);
        assert_eq!(runner.tests_passed(), 1);
        assert_eq!(runner.tests_failed(), 2);
    }

    #[tap_test]
    fn system_clock_sleep_yields_real_time() {
        let clock = SystemClock::new();
        let start = clock.now_ms();
        clock.sleep(Duration::from_millis(20));
        assert!(clock.now_ms() >= start + 20);
    }

    #[tap_test]
    fn dispatcher_paces_typing_on_scheduler() {
        let hid = LoggingHid::auto_connecting();
        let mut device = HidDevice::new(Box::new(hid.clone()));
        device
            .backend_mut()
            .start(&crate::ble::BleIdentity {
                name: "tap".into(),
                manufacturer: "tap".into(),
            })
            .unwrap();
        let clock = Arc::new(SystemClock::new());
        let dispatcher = CommandDispatcher::new(clock.clone());

        let start = clock.now_ms();
        let reply = dispatcher
            .dispatch(
                r#"{"device":"keyboard","action":"write","text":"abc","charDelayMs":10}"#,
                &mut device,
            )
            .unwrap();
        assert_eq!(reply, status::ok());
        assert!(clock.now_ms() >= start + 30);
        let reports = hid
            .take_calls()
            .into_iter()
            .filter(|c| matches!(c, HidCall::Keyboard(_)))
            .count();
        assert_eq!(reports, 6);
    }
}
