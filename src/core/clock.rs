//! Epoch-second clock seam.
//!
//! Deadlines in this engine (DTMF idle, silence timeout, timer slots,
//! session timeout) are whole epoch seconds. Routing them through a trait
//! keeps the workers testable without real waits.

use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    fn epoch_secs(&self) -> u64;
}

/// Wall clock
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Hand-advanced clock for tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<u64>,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, secs: u64) {
        *self.now.lock() += secs;
    }

    pub fn set(&self, secs: u64) {
        *self.now.lock() = secs;
    }
}

impl Clock for ManualClock {
    fn epoch_secs(&self) -> u64 {
        *self.now.lock()
    }
}
