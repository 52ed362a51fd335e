//! Progress Timer
//!
//! Tracks an elapsed position against a bounded or unbounded duration and
//! reports it to a subscriber at the host's tick rate until the duration is
//! reached. Typical use: driving a media progress bar without relying on the
//! media source for timing.
//! - Frame-synchronized ticks when the host renders frames, drift-compensated
//!   timeouts otherwise
//! - Clock and scheduling primitives are injected (`HostServices`)
//! - Deterministic offline host for tests and rendering (`EventLoop`)

pub mod clock;
pub mod error;
pub mod host;
pub mod options;
pub mod queue;
pub mod scheduler;
pub mod state;
pub mod timer;


pub use clock::{Clock, ManualClock, SystemClock};
pub use error::TimerError;
pub use host::{EventLoop, FrameHost, HostConfig, HostHandle, HostMode, HostServices, TimeoutHost};
pub use options::{Callback, TimerConfig, TimerOptions};
pub use scheduler::{Scheduler, SchedulerKind};
pub use state::Span;
pub use timer::{ProgressTimer, WeakProgressTimer};
