//! Clock abstraction used for timestamps and timers.
//!
//! The route table never reads wall-clock time directly. Everything goes
//! through a [`Clock`], so tests can drive expiration deterministically with a
//! [`ManualClock`] while production code uses a [`TokioClock`].

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Add;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// A point in time, in nanoseconds since the owning clock's epoch.
///
/// Only comparable with other timestamps from the same clock.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MonotonicTime(u64);

impl MonotonicTime {
    /// The clock's epoch.
    pub const ZERO: MonotonicTime = MonotonicTime(0);

    /// Creates a timestamp from nanoseconds since the epoch.
    pub const fn from_nanos(nanos: u64) -> Self {
        MonotonicTime(nanos)
    }

    /// Creates a timestamp from the elapsed time since the epoch.
    ///
    /// Saturates at `u64::MAX` nanoseconds.
    pub fn from_elapsed(elapsed: Duration) -> Self {
        MonotonicTime(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
    }

    /// Returns the number of nanoseconds since the epoch.
    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Returns the time elapsed from `earlier` to `self`, or zero if
    /// `earlier` is later than `self`.
    pub fn saturating_duration_since(&self, earlier: MonotonicTime) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for MonotonicTime {
    type Output = MonotonicTime;

    fn add(self, rhs: Duration) -> MonotonicTime {
        let rhs = u64::try_from(rhs.as_nanos()).unwrap_or(u64::MAX);
        MonotonicTime(self.0.saturating_add(rhs))
    }
}

impl fmt::Display for MonotonicTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callback run when a timer fires.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// A handle to a timer armed with [`Clock::after_fn`].
pub trait Timer: Send {
    /// Cancels the timer.
    ///
    /// Returns true if the timer was still pending, false if it already
    /// fired or was stopped before.
    fn stop(&mut self) -> bool;
}

/// Source of monotonic time and one-shot timers.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current time.
    fn now(&self) -> MonotonicTime;

    /// Runs `f` once, after `delay` has elapsed.
    ///
    /// The callback runs on whatever context the clock fires timers from and
    /// must not assume any lock held by the caller of `after_fn`.
    fn after_fn(&self, delay: Duration, f: TimerCallback) -> Box<dyn Timer>;
}

type TimerKey = (MonotonicTime, u64);

#[derive(Default)]
struct ManualClockState {
    now: MonotonicTime,
    next_timer_id: u64,
    timers: BTreeMap<TimerKey, TimerCallback>,
}

/// A clock that only moves when told to.
///
/// Time starts at [`MonotonicTime::ZERO`]. [`ManualClock::advance`] fires due
/// timers synchronously on the calling thread, in deadline order.
#[derive(Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualClockState>>,
}

impl ManualClock {
    /// Creates a new manual clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves time forward by `duration`, firing every timer that becomes due.
    ///
    /// While a timer fires, [`Clock::now`] reports that timer's deadline.
    /// Timers armed by a firing callback also fire during this call if their
    /// deadline is reached. No callback runs with the clock's lock held.
    pub fn advance(&self, duration: Duration) {
        let target = self.state.lock().now + duration;

        loop {
            let callback = {
                let mut guard = self.state.lock();
                let state = &mut *guard;
                match state.timers.first_entry() {
                    Some(entry) if entry.key().0 <= target => {
                        let ((deadline, _), callback) = entry.remove_entry();
                        state.now = state.now.max(deadline);
                        callback
                    }
                    _ => {
                        state.now = state.now.max(target);
                        return;
                    }
                }
            };

            callback();
        }
    }

    /// Returns the number of timers waiting to fire.
    pub fn pending_timers(&self) -> usize {
        self.state.lock().timers.len()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> MonotonicTime {
        self.state.lock().now
    }

    fn after_fn(&self, delay: Duration, f: TimerCallback) -> Box<dyn Timer> {
        let mut state = self.state.lock();
        let key = (state.now + delay, state.next_timer_id);
        state.next_timer_id += 1;
        state.timers.insert(key, f);

        Box::new(ManualTimer {
            state: Arc::downgrade(&self.state),
            key,
        })
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualClock")
            .field("now", &state.now)
            .field("pending_timers", &state.timers.len())
            .finish()
    }
}

struct ManualTimer {
    state: Weak<Mutex<ManualClockState>>,
    key: TimerKey,
}

impl Timer for ManualTimer {
    fn stop(&mut self) -> bool {
        match self.state.upgrade() {
            Some(state) => state.lock().timers.remove(&self.key).is_some(),
            None => false,
        }
    }
}

/// A real monotonic clock whose timers are tasks on a tokio runtime.
#[derive(Clone)]
pub struct TokioClock {
    handle: Handle,
    epoch: tokio::time::Instant,
}

impl TokioClock {
    /// Creates a clock that spawns its timers on `handle`.
    ///
    /// The runtime must have its time driver enabled and must outlive every
    /// table using this clock. Timers armed after the runtime has shut down
    /// never fire, so pending routes stop expiring until the table is
    /// closed.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            epoch: tokio::time::Instant::now(),
        }
    }

    /// Creates a clock bound to the runtime the caller is running on.
    ///
    /// Returns `None` outside of a tokio runtime.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Clock for TokioClock {
    fn now(&self) -> MonotonicTime {
        MonotonicTime::from_elapsed(self.epoch.elapsed())
    }

    fn after_fn(&self, delay: Duration, f: TimerCallback) -> Box<dyn Timer> {
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        });

        Box::new(TokioTimer { task: Some(task) })
    }
}

impl fmt::Debug for TokioClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioClock")
            .field("now", &self.now())
            .finish()
    }
}

struct TokioTimer {
    task: Option<JoinHandle<()>>,
}

impl Timer for TokioTimer {
    fn stop(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                let pending = !task.is_finished();
                task.abort();
                pending
            }
            None => false,
        }
    }
}
