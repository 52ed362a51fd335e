//! Clock sources
//!
//! Millisecond clocks consumed by the timer and the host event loop.
//! - Manual: only moves when told to (offline stepping, tests)
//! - System: monotonic wall time since creation

use std::cell::Cell;
use std::time::Instant;

/// A source of "now", in milliseconds since an arbitrary epoch.
pub trait Clock {
    fn now(&self) -> f64;
}

/// A clock that only moves when driven.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Cell::new(if start.is_finite() { start } else { 0.0 }),
        }
    }

    /// Move the clock to `t`. Never moves backwards.
    pub fn set(&self, t: f64) {
        if t.is_finite() && t > self.now.get() {
            self.now.set(t);
        }
    }

    /// Move the clock forward by `dt` milliseconds.
    pub fn advance(&self, dt: f64) {
        let d = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        self.now.set(self.now.get() + d);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }
}

/// Monotonic wall clock anchored at construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    anchor: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.anchor.elapsed().as_secs_f64() * 1000.0
    }
}
