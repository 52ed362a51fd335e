//! Tick schedulers
//!
//! Two interchangeable strategies over the host primitives, picked once per
//! timer by `select_scheduler`:
//! - Frame: one tick per rendered frame, stamped with the frame time
//! - Timeout: one tick per `frame_duration`, delay measured from the previous
//!   tick's timestamp so round-trip overhead does not accumulate

use crate::clock::Clock;
use crate::host::{FrameHost, HostHandle, HostServices, TimeoutHost};
use crate::options::TimerConfig;
use std::rc::Rc;
use tracing::debug;

/// A scheduled tick. Receives the frame timestamp when the host supplies one.
pub type Tick = Box<dyn FnOnce(Option<f64>)>;

/// Handle for one pending tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScheduleHandle(pub HostHandle);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerKind {
    Frame,
    Timeout,
}

pub trait Scheduler {
    fn kind(&self) -> SchedulerKind;

    /// Arrange exactly one future call of `tick`. `reference` is the
    /// timestamp used by the previous tick, or 0 for the first.
    fn schedule(&self, reference: f64, tick: Tick) -> ScheduleHandle;

    /// Guarantee the tick behind `handle` will not run. Idempotent.
    fn cancel(&self, handle: ScheduleHandle);
}

pub struct FrameScheduler {
    frames: Rc<dyn FrameHost>,
}

impl FrameScheduler {
    pub fn new(frames: Rc<dyn FrameHost>) -> Self {
        Self { frames }
    }
}

impl Scheduler for FrameScheduler {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Frame
    }

    fn schedule(&self, _reference: f64, tick: Tick) -> ScheduleHandle {
        ScheduleHandle(self.frames.request_frame(Box::new(move |t| tick(Some(t)))))
    }

    fn cancel(&self, handle: ScheduleHandle) {
        self.frames.cancel_frame(handle.0);
    }
}

pub struct TimeoutScheduler {
    clock: Rc<dyn Clock>,
    timeouts: Rc<dyn TimeoutHost>,
    frame_duration: f64,
}

impl TimeoutScheduler {
    pub fn new(clock: Rc<dyn Clock>, timeouts: Rc<dyn TimeoutHost>, frame_duration: f64) -> Self {
        Self {
            clock,
            timeouts,
            frame_duration,
        }
    }

    /// Delay until one frame after `reference`, never negative.
    pub fn delay_from(&self, reference: f64) -> f64 {
        (reference + self.frame_duration - self.clock.now()).max(0.0)
    }
}

impl Scheduler for TimeoutScheduler {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Timeout
    }

    fn schedule(&self, reference: f64, tick: Tick) -> ScheduleHandle {
        let delay = self.delay_from(reference);
        ScheduleHandle(self.timeouts.set_timeout(delay, Box::new(move || tick(None))))
    }

    fn cancel(&self, handle: ScheduleHandle) {
        self.timeouts.clear_timeout(handle.0);
    }
}

/// Pick the scheduler for a timer's lifetime.
pub fn select_scheduler(host: &HostServices, config: &TimerConfig) -> Box<dyn Scheduler> {
    match &host.frames {
        Some(frames) if !config.disable_animation_frame => {
            debug!("using frame-synchronized scheduler");
            Box::new(FrameScheduler::new(frames.clone()))
        }
        _ => {
            let frame_duration = config.frame_duration();
            debug!(frame_duration, "using timeout scheduler");
            Box::new(TimeoutScheduler::new(
                host.clock.clone(),
                host.timeouts.clone(),
                frame_duration,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::EventLoop;
    use std::cell::RefCell;

    #[test]
    fn test_selection_policy() {
        let with_frames = EventLoop::offline().services();
        let without = EventLoop::offline_without_frames().services();
        let disabled = TimerConfig {
            disable_animation_frame: true,
            ..Default::default()
        };

        assert_eq!(
            select_scheduler(&with_frames, &TimerConfig::default()).kind(),
            SchedulerKind::Frame
        );
        assert_eq!(select_scheduler(&with_frames, &disabled).kind(), SchedulerKind::Timeout);
        assert_eq!(
            select_scheduler(&without, &TimerConfig::default()).kind(),
            SchedulerKind::Timeout
        );
    }

    #[test]
    fn test_timeout_delay_compensates_drift() {
        let host = EventLoop::offline();
        let sched = TimeoutScheduler::new(host.clone(), host.clone(), 40.0);

        host.skip_by(100.0);
        assert!((sched.delay_from(100.0) - 40.0).abs() < 1e-10);
        assert!((sched.delay_from(90.0) - 30.0).abs() < 1e-10);
        assert!((sched.delay_from(0.0) - 0.0).abs() < 1e-10);
    }

    #[test]
    fn test_timeout_tick_has_no_timestamp() {
        let host = EventLoop::offline();
        let sched = TimeoutScheduler::new(host.clone(), host.clone(), 10.0);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = seen.clone();
        sched.schedule(0.0, Box::new(move |t| s.borrow_mut().push(t)));
        host.advance_by(9.0);
        assert!(seen.borrow().is_empty());
        host.advance_by(1.0);
        assert_eq!(*seen.borrow(), vec![None]);
    }

    #[test]
    fn test_frame_tick_carries_frame_time() {
        let host = EventLoop::offline();
        let sched = FrameScheduler::new(host.clone());
        let seen = Rc::new(RefCell::new(Vec::new()));

        host.advance_by(5.0);
        let s = seen.clone();
        sched.schedule(0.0, Box::new(move |t| s.borrow_mut().push(t)));
        host.step_frame();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert!((seen[0].unwrap() - host.frame_interval()).abs() < 1e-9);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let host = EventLoop::offline();
        for sched in [
            Box::new(FrameScheduler::new(host.clone())) as Box<dyn Scheduler>,
            Box::new(TimeoutScheduler::new(host.clone(), host.clone(), 10.0)),
        ] {
            let fired = Rc::new(RefCell::new(0));
            let f = fired.clone();
            let h = sched.schedule(0.0, Box::new(move |_| *f.borrow_mut() += 1));
            sched.cancel(h);
            sched.cancel(h);
            host.step_frames(2);
            host.advance_by(100.0);
            assert_eq!(*fired.borrow(), 0);
        }
    }
}
