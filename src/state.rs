//! Timer state
//!
//! A `State` is an immutable snapshot: every change produces a new value that
//! replaces the old one wholesale.

use std::fmt;

/// Target end value for the position, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Span {
    Finite(u64),
    Unbounded,
}

impl Span {
    /// Normalize a raw duration. Missing, NaN and infinite values mean
    /// unbounded; anything else is floored to a non-negative integer.
    /// Zero stays a real, already-reached duration.
    pub fn from_ms(ms: Option<f64>) -> Self {
        match ms {
            Some(d) if d.is_finite() => Span::Finite(d.floor().max(0.0) as u64),
            _ => Span::Unbounded,
        }
    }

    pub fn as_ms(&self) -> f64 {
        match self {
            Span::Finite(d) => *d as f64,
            Span::Unbounded => f64::INFINITY,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, Span::Unbounded)
    }
}

impl Default for Span {
    fn default() -> Self {
        Span::Unbounded
    }
}

impl From<u64> for Span {
    fn from(ms: u64) -> Self {
        Span::Finite(ms)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Span::Finite(d) => write!(f, "{}ms", d),
            Span::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// Position/duration snapshot plus the baseline used to project position
/// from clock readings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct State {
    /// Clock reading of the first tick since the last start/set.
    pub initial_timestamp: Option<f64>,
    pub initial_position: f64,
    pub position: f64,
    pub duration: Span,
}

impl State {
    /// Floor the position and clamp it into `[0, duration]`. Non-finite
    /// positions count as 0.
    pub fn new(position: f64, duration: Span) -> Self {
        let p = if position.is_finite() { position.floor() } else { 0.0 };
        let p = p.max(0.0).min(duration.as_ms());
        Self {
            initial_timestamp: None,
            initial_position: p,
            position: p,
            duration,
        }
    }

    /// Freeze the current position as the new starting point.
    pub fn rebased(&self) -> Self {
        let p = self.position.min(self.duration.as_ms());
        Self {
            initial_timestamp: None,
            initial_position: p,
            position: p,
            duration: self.duration,
        }
    }

    /// Project the position at `timestamp`. The first call after a rebase
    /// pins `initial_timestamp`. May overshoot the duration; see `reported`.
    pub fn advanced(&self, timestamp: f64) -> Self {
        let t0 = self.initial_timestamp.unwrap_or(timestamp);
        let elapsed = (timestamp - t0).max(0.0);
        Self {
            initial_timestamp: Some(t0),
            initial_position: self.initial_position,
            position: self.position.max(self.initial_position + elapsed),
            duration: self.duration,
        }
    }

    /// The value delivered to subscribers: floored and clamped to the duration.
    pub fn reported(&self) -> u64 {
        self.position.min(self.duration.as_ms()).max(0.0).floor() as u64
    }

    pub fn is_finished(&self) -> bool {
        match self.duration {
            Span::Finite(d) => self.position >= d as f64,
            Span::Unbounded => false,
        }
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new(0.0, Span::Unbounded)
    }
}
