//! Fixtures shared by the unit tests

use std::sync::atomic::{AtomicI64, Ordering};

use crate::auth::Clock;

pub const TEST_KEY_PEM: &str = include_str!("../tests/fixtures/AuthKey_TESTKEY123.p8");
pub const TEST_PUBLIC_KEY_PEM: &str = include_str!("../tests/fixtures/AuthKey_TESTKEY123.pub.pem");

pub const DEVICE_TOKEN: &str = "1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";

/// Clock that only moves when told to
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
