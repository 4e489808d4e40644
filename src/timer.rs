//! Turn timer: a countdown driven by explicit elapsed time rather than a scheduler.
//!
//! The owner feeds real (or virtual) elapsed time into [`GameTimer::tick`]. Remaining time drops in
//! whole steps; when it reaches zero the timer reports [`TimerEvent::Zero`] once and stays disarmed
//! until the next [`GameTimer::reset`].

use std::time::Duration;

/// Countdown granularity.
pub const DEFAULT_STEP_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Not running (never started, or stopped at game end).
    Stopped,
    /// Still counting; `remaining_ms` is the time left in the current turn.
    Counting { remaining_ms: u64 },
    /// Remaining time reached zero during this tick.
    Zero,
    /// A new turn started with this delay.
    Restarted { delay_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct GameTimer {
    step_ms: u64,
    remaining_ms: u64,
    delay_ms: u64,
    /// Elapsed time not yet consumed by a whole step.
    carry: Duration,
    /// Cleared when Zero fires; set again by reset.
    armed: bool,
    running: bool,
}

impl GameTimer {
    pub fn new(step_ms: u64) -> Self {
        Self {
            step_ms: step_ms.max(1),
            remaining_ms: 0,
            delay_ms: 0,
            carry: Duration::ZERO,
            armed: false,
            running: false,
        }
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    /// Delay of the current turn, as passed to the last reset.
    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Starts a new turn of `delay_ms`. Partial progress towards the next step is discarded.
    pub fn reset(&mut self, delay_ms: u64) -> TimerEvent {
        self.remaining_ms = delay_ms;
        self.delay_ms = delay_ms;
        self.carry = Duration::ZERO;
        self.armed = true;
        self.running = true;
        TimerEvent::Restarted { delay_ms }
    }

    /// Stops counting; later ticks report [`TimerEvent::Stopped`].
    pub fn stop(&mut self) {
        self.running = false;
        self.armed = false;
        self.carry = Duration::ZERO;
    }

    /// Advances by `elapsed`. Fires [`TimerEvent::Zero`] at most once per reset; any steps left in
    /// `elapsed` after it fires are dropped so a reset from the expiry handler starts clean.
    pub fn tick(&mut self, elapsed: Duration) -> TimerEvent {
        if !self.running {
            return TimerEvent::Stopped;
        }
        let step = Duration::from_millis(self.step_ms);
        self.carry += elapsed;
        while self.carry >= step {
            self.carry -= step;
            self.remaining_ms = self.remaining_ms.saturating_sub(self.step_ms);
            if self.remaining_ms == 0 && self.armed {
                self.armed = false;
                self.carry = Duration::ZERO;
                return TimerEvent::Zero;
            }
        }
        TimerEvent::Counting {
            remaining_ms: self.remaining_ms,
        }
    }
}

impl Default for GameTimer {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_MS)
    }
}
