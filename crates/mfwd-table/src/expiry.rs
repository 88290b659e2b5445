//! Expiration scheduling for pending routes.
//!
//! The cleanup timer is armed when the first pending route appears and is
//! re-armed after each sweep only while pending routes remain, so an idle
//! table holds no scheduled work.

use std::fmt;
use std::time::Duration;

use crate::clock::{Clock, Timer, TimerCallback};

/// The one-shot timer driving periodic expiration sweeps.
///
/// Each arming gets a new generation. A sweep whose generation is no longer
/// current was stopped after it had already started running and must not
/// sweep or re-arm.
pub(crate) struct CleanupTimer {
    interval: Duration,
    generation: u64,
    timer: Option<Box<dyn Timer>>,
}

impl CleanupTimer {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            generation: 0,
            timer: None,
        }
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Schedules a sweep one interval from now unless one is already
    /// scheduled. `sweep` builds the callback from the new generation.
    ///
    /// Returns true if a new timer was armed.
    pub(crate) fn arm(
        &mut self,
        clock: &dyn Clock,
        sweep: impl FnOnce(u64) -> TimerCallback,
    ) -> bool {
        if self.is_armed() {
            return false;
        }

        self.generation += 1;
        self.timer = Some(clock.after_fn(self.interval, sweep(self.generation)));
        true
    }

    /// Acknowledges the firing of the timer armed as `generation`.
    ///
    /// Returns false for a stale firing, which leaves the current timer
    /// untouched.
    pub(crate) fn fired(&mut self, generation: u64) -> bool {
        if !self.is_armed() || generation != self.generation {
            return false;
        }

        self.timer = None;
        true
    }

    /// Cancels any scheduled sweep.
    pub(crate) fn stop(&mut self) {
        if let Some(mut timer) = self.timer.take() {
            timer.stop();
        }
    }
}

impl fmt::Debug for CleanupTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupTimer")
            .field("interval", &self.interval)
            .field("armed", &self.is_armed())
            .finish()
    }
}
