//! Drift-corrected elapsed-time accrual.
//!
//! The accrual engine is a pure state-transition function: given an action,
//! the prior state and the current wall time it always returns a new state.
//! No I/O, no internal threads -- the registry schedules ticks and the
//! tracker applies them.
//!
//! ## State Transitions
//!
//! ```text
//! (start) -> Running <-> Paused -> (delete)
//! ```
//!
//! A single tick never credits more than `max_step_secs`, and a gap larger
//! than `sleep_gap_secs` is discarded entirely: wall-clock time spent
//! suspended or hibernated is not work.

use serde::{Deserialize, Serialize};

use crate::marker::MarkerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Running,
    Paused,
}

/// In-memory state of one marker timer.
///
/// `accumulated_secs` never decreases; `last_event_epoch_secs` is the base
/// against which the next elapsed gap is measured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub id: MarkerId,
    pub status: TimerStatus,
    pub accumulated_secs: u64,
    pub last_event_epoch_secs: i64,
}

impl TimerState {
    /// The `start` pseudo-transition: fresh id, zero duration, running.
    pub fn start(id: MarkerId, now: i64) -> Self {
        Self {
            id,
            status: TimerStatus::Running,
            accumulated_secs: 0,
            last_event_epoch_secs: now,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }
}

/// Actions over an existing state. `start` is [`TimerState::start`] and
/// `delete` is terminal with no resulting state; neither appears here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Paused -> Running, no backfill.
    Continue,
    /// Running -> Paused, crediting the capped elapsed gap.
    Pause,
    /// Periodic credit while Running; no-op otherwise.
    Tick,
    /// any -> Running on app/document reopen, no backfill.
    Restore,
    /// any -> Paused without crediting time.
    ForcePause,
}

/// Accrual bounds. `sleep_gap_secs` must exceed the tick period by a wide
/// margin; `max_step_secs` should be at least the tick period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualConfig {
    #[serde(default = "default_sleep_gap_secs")]
    pub sleep_gap_secs: i64,
    #[serde(default = "default_max_step_secs")]
    pub max_step_secs: i64,
}

fn default_sleep_gap_secs() -> i64 {
    60
}

fn default_max_step_secs() -> i64 {
    5
}

impl Default for AccrualConfig {
    fn default() -> Self {
        Self {
            sleep_gap_secs: default_sleep_gap_secs(),
            max_step_secs: default_max_step_secs(),
        }
    }
}

/// One accrual step's credit for the gap since the state's last event.
///
/// A gap strictly larger than `sleep_gap_secs` is interpreted as host
/// suspension or process kill and contributes 0; otherwise the gap is
/// credited, capped at `max_step_secs`.
pub fn capped_elapsed(state: &TimerState, now: i64, config: &AccrualConfig) -> u64 {
    let gap = (now - state.last_event_epoch_secs).max(0);
    if gap > config.sleep_gap_secs {
        return 0;
    }
    gap.min(config.max_step_secs).max(0) as u64
}

/// Pure, total transition function. Never panics, never does I/O.
pub fn apply(action: Action, state: &TimerState, now: i64, config: &AccrualConfig) -> TimerState {
    match action {
        Action::Continue | Action::Restore => TimerState {
            status: TimerStatus::Running,
            last_event_epoch_secs: now,
            ..state.clone()
        },
        Action::ForcePause => TimerState {
            status: TimerStatus::Paused,
            last_event_epoch_secs: now,
            ..state.clone()
        },
        Action::Pause => {
            let credit = if state.is_running() {
                capped_elapsed(state, now, config)
            } else {
                0
            };
            TimerState {
                status: TimerStatus::Paused,
                accumulated_secs: state.accumulated_secs + credit,
                last_event_epoch_secs: now,
                ..state.clone()
            }
        }
        Action::Tick => {
            if !state.is_running() {
                return state.clone();
            }
            TimerState {
                accumulated_secs: state.accumulated_secs + capped_elapsed(state, now, config),
                last_event_epoch_secs: now,
                ..state.clone()
            }
        }
    }
}
