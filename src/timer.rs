//! Progress Timer
//!
//! The user-facing API. Tracks a position against a duration and reports it
//! to a subscriber once per tick until the duration is reached.
//!
//! Running vs idle is the presence of a pending `ScheduleHandle`; there is no
//! separate flag. The subscriber may call back into the timer from inside a
//! tick, so no `RefCell` borrow is ever held across a callback.

use crate::clock::Clock;
use crate::error::TimerError;
use crate::host::HostServices;
use crate::options::{Callback, TimerOptions};
use crate::scheduler::{select_scheduler, ScheduleHandle, Scheduler, SchedulerKind};
use crate::state::{Span, State};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

/// The one outstanding tick: host handle plus the generation baked into its closure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Pending {
    handle: ScheduleHandle,
    generation: u64,
}

struct TimerInner {
    state: State,
    /// Bumped by every `set`, so a tick can tell its snapshot was replaced.
    epoch: u64,
    /// Bumped by every schedule.
    generation: u64,
    pending: Option<Pending>,
}

struct Shared {
    callback: Callback,
    clock: Rc<dyn Clock>,
    scheduler: Box<dyn Scheduler>,
    frame_duration: f64,
    inner: RefCell<TimerInner>,
}

impl Shared {
    fn emit(&self, position: u64, duration: Span) {
        let cb = self.callback.clone();
        cb(position, duration);
    }

    /// Schedule the next tick and install it as the pending one.
    fn schedule_tick(self: &Rc<Self>, reference: f64) {
        let generation = {
            let mut inner = self.inner.borrow_mut();
            inner.generation += 1;
            inner.generation
        };
        let weak = Rc::downgrade(self);
        let handle = self.scheduler.schedule(
            reference,
            Box::new(move |timestamp| {
                if let Some(shared) = weak.upgrade() {
                    shared.tick(generation, timestamp);
                }
            }),
        );
        self.inner.borrow_mut().pending = Some(Pending { handle, generation });
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.borrow().pending.map(|p| p.generation) == Some(generation)
    }

    fn tick(self: &Rc<Self>, generation: u64, timestamp: Option<f64>) {
        if !self.is_current(generation) {
            return;
        }
        let timestamp = timestamp.unwrap_or_else(|| self.clock.now());

        let (state, epoch) = {
            let mut inner = self.inner.borrow_mut();
            inner.state = inner.state.advanced(timestamp);
            (inner.state, inner.epoch)
        };
        trace!(timestamp, position = state.position, "tick");

        self.emit(state.reported(), state.duration);

        let reschedule = {
            let mut inner = self.inner.borrow_mut();
            if inner.pending.map(|p| p.generation) != Some(generation) {
                // stop()/start() from the callback already decided what happens next
                return;
            }
            let replaced = inner.epoch != epoch;
            if replaced || !state.is_finished() {
                true
            } else {
                inner.pending = None;
                false
            }
        };

        if reschedule {
            self.schedule_tick(timestamp);
        } else {
            debug!(duration = %state.duration, "duration reached");
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(p) = self.inner.get_mut().pending.take() {
            self.scheduler.cancel(p.handle);
        }
    }
}

/// Reports elapsed position against a duration at the host's tick rate.
///
/// Cloning yields another handle to the same timer. Pending ticks do not
/// keep the timer alive; once the last handle drops, the pending tick is
/// cancelled. Subscribers that need to reach the timer should hold a
/// `WeakProgressTimer` to avoid a reference cycle.
#[derive(Clone)]
pub struct ProgressTimer {
    shared: Rc<Shared>,
}

/// Non-owning handle to a `ProgressTimer`.
#[derive(Clone)]
pub struct WeakProgressTimer {
    shared: Weak<Shared>,
}

impl WeakProgressTimer {
    pub fn upgrade(&self) -> Option<ProgressTimer> {
        self.shared.upgrade().map(|shared| ProgressTimer { shared })
    }
}

impl ProgressTimer {
    /// Create an idle timer at `(0, unbounded)`. The subscriber receives that
    /// initial value immediately.
    pub fn new(options: impl Into<TimerOptions>, host: HostServices) -> Result<Self, TimerError> {
        let options = options.into();
        let callback = options.callback.ok_or(TimerError::MissingCallback)?;
        let config = options.config;
        let scheduler = select_scheduler(&host, &config);

        if let Some(rate) = config.update_rate {
            // Reported from the host queue, never inline with construction.
            host.timeouts.set_timeout(
                0.0,
                Box::new(move || {
                    warn!(
                        update_rate = rate,
                        "updateRate is deprecated, use fallbackTargetFrameRate instead"
                    );
                }),
            );
        }

        let timer = Self {
            shared: Rc::new(Shared {
                callback,
                clock: host.clock.clone(),
                scheduler,
                frame_duration: config.frame_duration(),
                inner: RefCell::new(TimerInner {
                    state: State::default(),
                    epoch: 0,
                    generation: 0,
                    pending: None,
                }),
            }),
        };
        timer.reset();
        Ok(timer)
    }

    /// Create a timer from a bare callback and default configuration.
    pub fn with_callback<F>(callback: F, host: HostServices) -> Result<Self, TimerError>
    where
        F: Fn(u64, Span) + 'static,
    {
        Self::new(TimerOptions::new(callback), host)
    }

    pub fn downgrade(&self) -> WeakProgressTimer {
        WeakProgressTimer {
            shared: Rc::downgrade(&self.shared),
        }
    }

    /// Install a new position and duration.
    ///
    /// `None`, NaN and infinite durations mean unbounded; `Some(0.0)` is a
    /// finished zero-length duration. The position is floored and clamped
    /// into `[0, duration]`. While idle the subscriber is told immediately;
    /// while running the next tick reports it.
    pub fn set(&self, position: f64, duration: Option<f64>) -> &Self {
        self.set_span(position, Span::from_ms(duration))
    }

    /// Install a new position, keeping the current duration.
    pub fn set_position(&self, position: f64) -> &Self {
        let duration = self.duration();
        self.set_span(position, duration)
    }

    pub fn set_span(&self, position: f64, duration: Span) -> &Self {
        let state = State::new(position, duration);
        let idle = {
            let mut inner = self.shared.inner.borrow_mut();
            inner.state = state;
            inner.epoch += 1;
            inner.pending.is_none()
        };
        if idle {
            self.shared.emit(state.reported(), state.duration);
        }
        self
    }

    /// Begin or resume ticking from the current position. No-op while running.
    pub fn start(&self) -> &Self {
        {
            let mut inner = self.shared.inner.borrow_mut();
            if inner.pending.is_some() {
                return self;
            }
            inner.state = inner.state.rebased();
            debug!(position = inner.state.position, duration = %inner.state.duration, "start");
        }
        self.shared.schedule_tick(0.0);
        self
    }

    /// Pause ticking, keeping the position. Does not report.
    pub fn stop(&self) -> &Self {
        let pending = self.shared.inner.borrow_mut().pending.take();
        if let Some(p) = pending {
            self.shared.scheduler.cancel(p.handle);
            debug!("stop");
        }
        self
    }

    /// Stop and return to `(0, unbounded)`.
    pub fn reset(&self) -> &Self {
        self.stop().set_span(0.0, Span::Unbounded)
    }

    /// Current position as it would be reported.
    pub fn position(&self) -> u64 {
        self.shared.inner.borrow().state.reported()
    }

    pub fn duration(&self) -> Span {
        self.shared.inner.borrow().state.duration
    }

    pub fn is_running(&self) -> bool {
        self.shared.inner.borrow().pending.is_some()
    }

    pub fn scheduler_kind(&self) -> SchedulerKind {
        self.shared.scheduler.kind()
    }

    /// Milliseconds between ticks on the timeout scheduler.
    pub fn frame_duration(&self) -> f64 {
        self.shared.frame_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::EventLoop;
    use crate::options::TimerConfig;

    type Log = Rc<RefCell<Vec<(u64, Span)>>>;

    fn recorder() -> (Log, impl Fn(u64, Span) + 'static) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        (log, move |p, d| l.borrow_mut().push((p, d)))
    }

    #[test]
    fn test_construction_reports_initial_state() {
        let host = EventLoop::offline();
        let (log, cb) = recorder();
        let timer = ProgressTimer::with_callback(cb, host.services()).unwrap();

        assert_eq!(*log.borrow(), vec![(0, Span::Unbounded)]);
        assert!(!timer.is_running());
        assert_eq!(timer.position(), 0);
        assert_eq!(timer.duration(), Span::Unbounded);
    }

    #[test]
    fn test_missing_callback() {
        let host = EventLoop::offline();
        let result = ProgressTimer::new(TimerOptions::default(), host.services());
        assert!(matches!(result, Err(TimerError::MissingCallback)));
    }

    #[test]
    fn test_set_position_keeps_duration() {
        let host = EventLoop::offline();
        let (log, cb) = recorder();
        let timer = ProgressTimer::with_callback(cb, host.services()).unwrap();

        timer.set(10.0, Some(500.0)).set_position(700.0);
        assert_eq!(log.borrow().last(), Some(&(500, Span::Finite(500))));
        assert_eq!(timer.duration(), Span::Finite(500));
    }

    #[test]
    fn test_set_while_running_reports_on_next_tick() {
        let host = EventLoop::offline();
        let (log, cb) = recorder();
        let timer = ProgressTimer::with_callback(cb, host.services()).unwrap();

        timer.start();
        host.step_frame();
        let before = log.borrow().len();

        timer.set(300.0, Some(1000.0));
        assert_eq!(log.borrow().len(), before);

        host.step_frame();
        assert_eq!(log.borrow().last(), Some(&(300, Span::Finite(1000))));
    }

    #[test]
    fn test_scheduler_choice_is_exposed() {
        let host = EventLoop::offline();
        let timer = ProgressTimer::new(
            TimerOptions::new(|_, _| {}).with_config(TimerConfig {
                disable_animation_frame: true,
                fallback_target_frame_rate: 20.0,
                ..Default::default()
            }),
            host.services(),
        )
        .unwrap();
        assert_eq!(timer.scheduler_kind(), SchedulerKind::Timeout);
        assert!((timer.frame_duration() - 50.0).abs() < 1e-10);
    }

    #[test]
    fn test_legacy_update_rate_warns_asynchronously() {
        let host = EventLoop::offline_without_frames();
        let timer = ProgressTimer::new(
            TimerOptions::new(|_, _| {}).with_config(TimerConfig {
                update_rate: Some(1.0),
                ..Default::default()
            }),
            host.services(),
        )
        .unwrap();

        // Only the deprecation notice is queued; the timer itself is idle.
        assert_eq!(host.pending(), 1);
        assert!(!timer.is_running());
        assert!((timer.frame_duration() - 1000.0 / 60.0).abs() < 1e-10);

        host.run_due();
        assert!(!host.has_pending());
    }

    #[test]
    fn test_dropping_last_handle_cancels_pending_tick() {
        let host = EventLoop::offline();
        let (log, cb) = recorder();
        let timer = ProgressTimer::with_callback(cb, host.services()).unwrap();
        let weak = timer.downgrade();

        timer.start();
        assert!(host.has_pending());
        drop(timer);

        assert!(weak.upgrade().is_none());
        assert!(!host.has_pending());
        host.step_frames(3);
        assert_eq!(log.borrow().len(), 1);
    }
}
