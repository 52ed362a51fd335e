//! Timer options and configuration
//!
//! `TimerConfig` holds the tunables and deserializes from the camelCase
//! object shape (`fallbackTargetFrameRate`, `disableAnimationFrame`,
//! `updateRate`). `TimerOptions` pairs it with the callback.

use crate::error::TimerError;
use crate::state::Span;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

/// Subscriber invoked with `(position, duration)`.
///
/// `Fn` rather than `FnMut`: the sink may call back into the timer, which
/// can report again before the outer call returns.
pub type Callback = Rc<dyn Fn(u64, Span)>;

pub const DEFAULT_TARGET_FRAME_RATE: f64 = 30.0;

/// Smallest interval the legacy `updateRate` option may request (60 Hz).
pub const MIN_UPDATE_RATE_MS: f64 = 1000.0 / 60.0;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimerConfig {
    /// Tick rate of the timeout scheduler.
    pub fallback_target_frame_rate: f64,
    /// Use the timeout scheduler even when the host can sync to frames.
    pub disable_animation_frame: bool,
    /// Deprecated: minimum interval in milliseconds.
    pub update_rate: Option<f64>,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            fallback_target_frame_rate: DEFAULT_TARGET_FRAME_RATE,
            disable_animation_frame: false,
            update_rate: None,
        }
    }
}

impl TimerConfig {
    /// Parse from a JSON object.
    pub fn from_json(value: &Value) -> Result<Self, TimerError> {
        if !value.is_object() {
            return Err(TimerError::InvalidOptions(json_kind(value).to_string()));
        }
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Target milliseconds between timeout-scheduled ticks.
    pub fn frame_duration(&self) -> f64 {
        if let Some(rate) = self.update_rate.filter(|r| r.is_finite()) {
            return rate.max(MIN_UPDATE_RATE_MS);
        }
        let fps = self.fallback_target_frame_rate;
        let fps = if fps.is_finite() && fps > 0.0 {
            fps
        } else {
            DEFAULT_TARGET_FRAME_RATE
        };
        1000.0 / fps
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Everything needed to construct a timer.
#[derive(Clone, Default)]
pub struct TimerOptions {
    pub callback: Option<Callback>,
    pub config: TimerConfig,
}

impl TimerOptions {
    /// Options with just a callback and default configuration.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(u64, Span) + 'static,
    {
        Self {
            callback: Some(Rc::new(callback)),
            config: TimerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: TimerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build from a JSON configuration object and an optional callback.
    pub fn from_json(value: &Value, callback: Option<Callback>) -> Result<Self, TimerError> {
        let config = TimerConfig::from_json(value)?;
        let callback = callback.ok_or(TimerError::MissingCallback)?;
        Ok(Self {
            callback: Some(callback),
            config,
        })
    }
}

/// A bare callback is shorthand for options with that callback.
impl<F> From<F> for TimerOptions
where
    F: Fn(u64, Span) + 'static,
{
    fn from(callback: F) -> Self {
        Self::new(callback)
    }
}

impl fmt::Debug for TimerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerOptions")
            .field("callback", &self.callback.as_ref().map(|_| "Fn(u64, Span)"))
            .field("config", &self.config)
            .finish()
    }
}
