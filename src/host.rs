//! Host scheduling primitives
//!
//! The timer never touches ambient timing facilities. It is handed a
//! `HostServices` bundle: a clock, a timeout pair and (optionally) a
//! frame-synchronized pair.
//!
//! `EventLoop` is a single-threaded host implementing all three:
//! - Offline: the clock only moves via `advance_to` / `step_frame` (tests, rendering)
//! - Realtime: wall clock, `run_until` sleeps with spin_sleep until the next event

use crate::clock::{Clock, ManualClock, SystemClock};
use crate::queue::DeadlineQueue;
use spin_sleep::SpinSleeper;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;
use tracing::trace;

/// Opaque handle returned by a host scheduling primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostHandle(pub u64);

/// "Call this once after at least `delay_ms` milliseconds."
pub trait TimeoutHost {
    fn set_timeout(&self, delay_ms: f64, f: Box<dyn FnOnce()>) -> HostHandle;
    /// Must guarantee the callback will not run. Unknown handles are ignored.
    fn clear_timeout(&self, handle: HostHandle);
}

/// "Call this once before the next frame is rendered", with the frame timestamp.
pub trait FrameHost {
    fn request_frame(&self, f: Box<dyn FnOnce(f64)>) -> HostHandle;
    /// Must guarantee the callback will not run. Unknown handles are ignored.
    fn cancel_frame(&self, handle: HostHandle);
}

/// Everything a timer needs from its host.
#[derive(Clone)]
pub struct HostServices {
    pub clock: Rc<dyn Clock>,
    pub timeouts: Rc<dyn TimeoutHost>,
    /// `None` when the host has no frame-synchronized primitive.
    pub frames: Option<Rc<dyn FrameHost>>,
}

impl HostServices {
    pub fn new(clock: Rc<dyn Clock>, timeouts: Rc<dyn TimeoutHost>) -> Self {
        Self {
            clock,
            timeouts,
            frames: None,
        }
    }

    pub fn with_frames(mut self, frames: Rc<dyn FrameHost>) -> Self {
        self.frames = Some(frames);
        self
    }
}

/// Event loop execution mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostMode {
    Realtime,
    Offline,
}

/// Configuration for an `EventLoop`.
#[derive(Clone, Debug)]
pub struct HostConfig {
    /// Render rate driving frame callbacks.
    pub fps: f64,
    /// Whether `services()` exposes the frame primitive.
    pub frames_enabled: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            fps: 60.0,
            frames_enabled: true,
        }
    }
}

type TimeoutFn = Box<dyn FnOnce()>;
type FrameFn = Box<dyn FnOnce(f64)>;

/// Upper bound on events processed by one `advance_to` call.
const MAX_EVENTS_PER_ADVANCE: usize = 200_000;

struct LoopInner {
    next_id: u64,
    seq: u64,
    timeouts: DeadlineQueue<TimeoutFn>,
    /// Keyed by handle id, so iteration order is request order.
    frame_waiters: BTreeMap<u64, FrameFn>,
    /// Waiters of the frame being delivered. Still cancellable until called.
    frame_batch: BTreeMap<u64, FrameFn>,
    /// Boundary index the pending frame waiters will be served at.
    frame_due: Option<u64>,
    last_frame: Option<u64>,
}

impl LoopInner {
    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn alloc_seq(&mut self) -> u64 {
        let s = self.seq;
        self.seq += 1;
        s
    }
}

enum Event {
    Timeout(TimeoutFn),
    Frame(f64, Vec<u64>),
}

/// Single-threaded host event loop.
pub struct EventLoop {
    pub mode: HostMode,
    offline_clock: ManualClock,
    wall_clock: SystemClock,
    frame_interval: f64,
    frames_enabled: bool,
    sleeper: SpinSleeper,
    inner: RefCell<LoopInner>,
}

impl EventLoop {
    pub fn new(mode: HostMode, config: HostConfig) -> Rc<Self> {
        let fps = if config.fps.is_finite() && config.fps > 0.0 {
            config.fps
        } else {
            60.0
        };
        Rc::new(Self {
            mode,
            offline_clock: ManualClock::new(0.0),
            wall_clock: SystemClock::new(),
            frame_interval: 1000.0 / fps,
            frames_enabled: config.frames_enabled,
            sleeper: SpinSleeper::default(),
            inner: RefCell::new(LoopInner {
                next_id: 1,
                seq: 0,
                timeouts: DeadlineQueue::new(),
                frame_waiters: BTreeMap::new(),
                frame_batch: BTreeMap::new(),
                frame_due: None,
                last_frame: None,
            }),
        })
    }

    /// Offline loop with default configuration.
    pub fn offline() -> Rc<Self> {
        Self::new(HostMode::Offline, HostConfig::default())
    }

    /// Offline loop whose services lack the frame primitive.
    pub fn offline_without_frames() -> Rc<Self> {
        Self::new(
            HostMode::Offline,
            HostConfig {
                frames_enabled: false,
                ..Default::default()
            },
        )
    }

    pub fn realtime(config: HostConfig) -> Rc<Self> {
        Self::new(HostMode::Realtime, config)
    }

    /// Bundle this loop as the services a timer consumes.
    pub fn services(self: &Rc<Self>) -> HostServices {
        let services = HostServices::new(self.clone(), self.clone());
        if self.frames_enabled {
            services.with_frames(self.clone())
        } else {
            services
        }
    }

    /// Current time in milliseconds.
    pub fn now(&self) -> f64 {
        match self.mode {
            HostMode::Offline => self.offline_clock.now(),
            HostMode::Realtime => self.wall_clock.now(),
        }
    }

    pub fn frame_interval(&self) -> f64 {
        self.frame_interval
    }

    /// Number of pending timeouts and frame requests.
    pub fn pending(&self) -> usize {
        let inner = self.inner.borrow();
        inner.timeouts.len() + inner.frame_waiters.len() + inner.frame_batch.len()
    }

    pub fn has_pending(&self) -> bool {
        self.pending() > 0
    }

    /// Index of the first frame boundary not yet delivered, at or after now.
    /// Boundaries are `k * frame_interval`, always computed the same way so
    /// re-deriving the index from a boundary time is exact.
    fn next_frame_index(&self) -> u64 {
        let now = self.now().max(0.0);
        let iv = self.frame_interval;
        let mut k = (now / iv).ceil() as u64;
        if (k as f64) * iv < now {
            k += 1;
        } else if k > 0 && ((k - 1) as f64) * iv >= now {
            k -= 1;
        }
        match self.inner.borrow().last_frame {
            Some(last) if last >= k => last + 1,
            _ => k,
        }
    }

    fn frame_time(&self, index: u64) -> f64 {
        index as f64 * self.frame_interval
    }

    /// Earliest of the next timeout and the next frame (if anyone is waiting on one).
    pub fn peek_next_event_time(&self) -> Option<f64> {
        let (t_timeout, frame_due) = {
            let mut inner = self.inner.borrow_mut();
            (inner.timeouts.peek_deadline(), inner.frame_due)
        };
        let t_frame = frame_due.map(|k| self.frame_time(k));
        match (t_timeout, t_frame) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Pull exactly one event due at or before `t` out of the loop.
    fn take_event(&self, t: f64) -> Option<Event> {
        let mut inner = self.inner.borrow_mut();
        let frame = inner
            .frame_due
            .map(|k| (k, self.frame_time(k)))
            .filter(|(_, at)| *at <= t);
        let t_timeout = inner.timeouts.peek_deadline().filter(|d| *d <= t);

        match (t_timeout, frame) {
            (Some(a), Some((k, at))) if at < a => Self::take_frame(&mut inner, k, at),
            (Some(a), _) => inner.timeouts.pop_due(a).map(|due| Event::Timeout(due.meta)),
            (None, Some((k, at))) => Self::take_frame(&mut inner, k, at),
            (None, None) => None,
        }
    }

    fn take_frame(inner: &mut LoopInner, index: u64, at: f64) -> Option<Event> {
        inner.last_frame = Some(index);
        inner.frame_due = None;
        let waiters = std::mem::take(&mut inner.frame_waiters);
        let ids = waiters.keys().copied().collect();
        inner.frame_batch.extend(waiters);
        Some(Event::Frame(at, ids))
    }

    /// Run one event. The loop is not borrowed while callbacks execute.
    fn dispatch(&self, event: Event) {
        match event {
            Event::Timeout(f) => f(),
            Event::Frame(at, ids) => {
                trace!(at, count = ids.len(), "frame");
                for id in ids {
                    // An earlier waiter in this frame may have cancelled it.
                    let waiter = self.inner.borrow_mut().frame_batch.remove(&id);
                    if let Some(f) = waiter {
                        f(at);
                    }
                }
            }
        }
    }

    /// Advance offline time to `target`, firing every event due on the way
    /// at its own deadline.
    pub fn advance_to(&self, target: f64) {
        let target = if target.is_finite() { target } else { self.now() };
        let mut processed = 0;

        while let Some(next_t) = self.peek_next_event_time() {
            if next_t > target {
                break;
            }
            self.offline_clock.set(next_t);
            let Some(event) = self.take_event(self.now()) else {
                break;
            };
            self.dispatch(event);

            processed += 1;
            if processed > MAX_EVENTS_PER_ADVANCE {
                panic!(
                    "advance_to({}) exceeded {} events - likely runaway rescheduling",
                    target, MAX_EVENTS_PER_ADVANCE
                );
            }
        }

        self.offline_clock.set(target);
    }

    /// Advance offline time by `dt` milliseconds.
    pub fn advance_by(&self, dt: f64) {
        let d = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        self.advance_to(self.now() + d);
    }

    /// Move the offline clock without firing anything, as a host that fell
    /// behind would. Follow with `run_due`.
    pub fn skip_by(&self, dt: f64) {
        self.offline_clock.advance(dt);
    }

    /// Fire everything due at the current time.
    pub fn run_due(&self) {
        let now = self.now();
        let mut processed = 0;
        while let Some(event) = self.take_event(now) {
            self.dispatch(event);
            processed += 1;
            if processed > MAX_EVENTS_PER_ADVANCE {
                panic!(
                    "run_due() exceeded {} events - likely runaway rescheduling",
                    MAX_EVENTS_PER_ADVANCE
                );
            }
        }
    }

    /// Advance offline time to the next frame boundary and render it.
    pub fn step_frame(&self) {
        let due = self.inner.borrow().frame_due;
        let k = due.unwrap_or_else(|| self.next_frame_index());
        let t = self.frame_time(k);
        self.advance_to(t);
    }

    pub fn step_frames(&self, n: usize) {
        for _ in 0..n {
            self.step_frame();
        }
    }

    /// Run in realtime until `is_done` holds or nothing is left to run.
    pub fn run_until<F>(&self, is_done: F)
    where
        F: Fn() -> bool,
    {
        loop {
            if is_done() {
                break;
            }

            let Some(next_t) = self.peek_next_event_time() else {
                break;
            };

            let now = self.now();
            if next_t <= now {
                if let Some(event) = self.take_event(now) {
                    self.dispatch(event);
                }
                continue;
            }

            let dt_ms = (next_t - now).max(0.0);
            self.sleeper.sleep(Duration::from_secs_f64(dt_ms / 1000.0));
        }
    }
}

impl Clock for EventLoop {
    fn now(&self) -> f64 {
        EventLoop::now(self)
    }
}

impl TimeoutHost for EventLoop {
    fn set_timeout(&self, delay_ms: f64, f: Box<dyn FnOnce()>) -> HostHandle {
        let delay = if delay_ms.is_finite() && delay_ms > 0.0 {
            delay_ms
        } else {
            0.0
        };
        let deadline = self.now() + delay;
        let mut inner = self.inner.borrow_mut();
        let id = inner.alloc_id();
        let seq = inner.alloc_seq();
        inner.timeouts.push(id, deadline, seq, f);
        HostHandle(id)
    }

    fn clear_timeout(&self, handle: HostHandle) {
        self.inner.borrow_mut().timeouts.cancel(handle.0);
    }
}

impl FrameHost for EventLoop {
    fn request_frame(&self, f: Box<dyn FnOnce(f64)>) -> HostHandle {
        let next = self.next_frame_index();
        let mut inner = self.inner.borrow_mut();
        let id = inner.alloc_id();
        inner.frame_waiters.insert(id, f);
        inner.frame_due.get_or_insert(next);
        HostHandle(id)
    }

    fn cancel_frame(&self, handle: HostHandle) {
        let mut inner = self.inner.borrow_mut();
        inner.frame_waiters.remove(&handle.0);
        inner.frame_batch.remove(&handle.0);
        if inner.frame_waiters.is_empty() {
            inner.frame_due = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_timeouts_fire_at_their_deadline() {
        let host = EventLoop::offline();
        let log = Rc::new(RefCell::new(Vec::new()));

        for (delay, tag) in [(30.0, "b"), (10.0, "a"), (30.0, "c")] {
            let l = log.clone();
            let h = host.clone();
            host.set_timeout(delay, Box::new(move || l.borrow_mut().push((tag, h.now()))));
        }

        host.advance_to(20.0);
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(log.borrow()[0], ("a", 10.0));
        assert!((host.now() - 20.0).abs() < 1e-10);

        host.advance_to(30.0);
        let tags: Vec<_> = log.borrow().iter().map(|(t, _)| *t).collect();
        assert_eq!(tags, vec!["a", "b", "c"]);
        assert!(!host.has_pending());
    }

    #[test]
    fn test_clear_timeout_prevents_firing() {
        let host = EventLoop::offline();
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        let h = host.set_timeout(5.0, Box::new(move || f.set(true)));

        host.clear_timeout(h);
        host.clear_timeout(h);
        host.advance_by(100.0);
        assert!(!fired.get());
    }

    #[test]
    fn test_negative_delay_is_immediate() {
        let host = EventLoop::offline();
        let fired = Rc::new(Cell::new(0));
        let f = fired.clone();
        host.set_timeout(-50.0, Box::new(move || f.set(f.get() + 1)));

        host.run_due();
        assert_eq!(fired.get(), 1);
        assert!((host.now() - 0.0).abs() < 1e-10);
    }

    #[test]
    fn test_frame_requested_during_frame_waits_for_next() {
        let host = EventLoop::offline();
        let stamps = Rc::new(RefCell::new(Vec::new()));

        let s = stamps.clone();
        let h = host.clone();
        host.request_frame(Box::new(move |t| {
            s.borrow_mut().push(t);
            let s2 = s.clone();
            h.request_frame(Box::new(move |t| s2.borrow_mut().push(t)));
        }));

        host.step_frame();
        assert_eq!(stamps.borrow().len(), 1);

        host.step_frame();
        let stamps = stamps.borrow();
        assert_eq!(stamps.len(), 2);
        assert!((stamps[1] - stamps[0] - host.frame_interval()).abs() < 1e-9);
    }

    #[test]
    fn test_cancel_frame() {
        let host = EventLoop::offline();
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        let h = host.request_frame(Box::new(move |_| f.set(true)));
        host.cancel_frame(h);
        host.step_frames(3);
        assert!(!fired.get());
        assert!(!host.has_pending());
    }

    #[test]
    fn test_skip_then_run_due_fires_late() {
        let host = EventLoop::offline();
        let seen = Rc::new(Cell::new(-1.0));
        let s = seen.clone();
        let h = host.clone();
        host.set_timeout(10.0, Box::new(move || s.set(h.now())));

        host.skip_by(100.0);
        assert!(seen.get() < 0.0);
        host.run_due();
        assert!((seen.get() - 100.0).abs() < 1e-10);
    }

    #[test]
    fn test_cancel_within_same_frame_prevents_later_waiter() {
        let host = EventLoop::offline();
        let fired = Rc::new(RefCell::new(Vec::new()));
        let victim = Rc::new(Cell::new(None));

        let f = fired.clone();
        let v = victim.clone();
        let h = host.clone();
        host.request_frame(Box::new(move |_| {
            f.borrow_mut().push("first");
            if let Some(handle) = v.get() {
                h.cancel_frame(handle);
            }
        }));
        let f = fired.clone();
        let handle = host.request_frame(Box::new(move |_| f.borrow_mut().push("second")));
        victim.set(Some(handle));

        host.step_frames(2);
        assert_eq!(*fired.borrow(), vec!["first"]);
        assert!(!host.has_pending());
    }

    #[test]
    fn test_services_respect_frames_enabled() {
        assert!(EventLoop::offline().services().frames.is_some());
        assert!(EventLoop::offline_without_frames().services().frames.is_none());
    }

    #[test]
    fn test_realtime_run_until_drains() {
        let host = EventLoop::realtime(HostConfig::default());
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        host.set_timeout(2.0, Box::new(move || c.set(c.get() + 1)));

        host.run_until(|| false);
        assert_eq!(count.get(), 1);
        assert!(host.now() >= 2.0);
    }
}
