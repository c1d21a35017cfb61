//! In-memory registry of active (ticking) timers.
//!
//! Owns one interval task per active id. Ticks are funneled into a single
//! channel and drained by one consumer, so per-id ticks are never delivered
//! concurrently and every entry point stays a serialized command on the
//! in-memory state.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::marker::MarkerId;
use crate::timer::TimerState;

struct ActiveTimer {
    state: TimerState,
    /// Portion of `accumulated_secs` already written to the ledger.
    flushed_secs: u64,
    ticker: JoinHandle<()>,
}

pub struct TimerRegistry {
    tick_period: Duration,
    active: HashMap<MarkerId, ActiveTimer>,
    /// Ids started by a user action in this process lifetime, as opposed
    /// to markers merely reloaded from a previous session. The auto-stop
    /// policy needs the distinction.
    session_started: HashSet<MarkerId>,
    tick_tx: UnboundedSender<MarkerId>,
    tick_rx: Option<UnboundedReceiver<MarkerId>>,
}

impl TimerRegistry {
    pub fn new(tick_period: Duration) -> Self {
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        Self {
            tick_period,
            active: HashMap::new(),
            session_started: HashSet::new(),
            tick_tx,
            tick_rx: Some(tick_rx),
        }
    }

    /// The consumer end of the tick channel. Taken once by the host's run
    /// loop.
    pub fn take_tick_receiver(&mut self) -> Option<UnboundedReceiver<MarkerId>> {
        self.tick_rx.take()
    }

    /// Register a fixed-period tick source for `id`. Idempotent: a no-op
    /// if the id is already active.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_ticking(&mut self, state: TimerState, started_this_session: bool) {
        let id = state.id.clone();
        if self.active.contains_key(&id) {
            return;
        }
        if started_this_session {
            self.session_started.insert(id.clone());
        }

        let tx = self.tick_tx.clone();
        let period = self.tick_period;
        let tick_id = id.clone();
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of an interval completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if tx.send(tick_id.clone()).is_err() {
                    break;
                }
            }
        });

        let flushed_secs = state.accumulated_secs;
        self.active.insert(
            id,
            ActiveTimer {
                state,
                flushed_secs,
                ticker,
            },
        );
    }

    /// Cancel the tick source and drop bookkeeping. Safe on unknown ids.
    pub fn stop_ticking(&mut self, id: &MarkerId) {
        if let Some(timer) = self.active.remove(id) {
            timer.ticker.abort();
        }
    }

    pub fn is_active(&self, id: &MarkerId) -> bool {
        self.active.contains_key(id)
    }

    pub fn started_this_session(&self, id: &MarkerId) -> bool {
        self.session_started.contains(id)
    }

    pub fn state(&self, id: &MarkerId) -> Option<&TimerState> {
        self.active.get(id).map(|timer| &timer.state)
    }

    pub fn update_state(&mut self, id: &MarkerId, state: TimerState) -> bool {
        match self.active.get_mut(id) {
            Some(timer) => {
                timer.state = state;
                true
            }
            None => false,
        }
    }

    pub fn flushed_secs(&self, id: &MarkerId) -> Option<u64> {
        self.active.get(id).map(|timer| timer.flushed_secs)
    }

    pub fn set_flushed_secs(&mut self, id: &MarkerId, flushed: u64) {
        if let Some(timer) = self.active.get_mut(id) {
            timer.flushed_secs = flushed;
        }
    }

    pub fn active_ids(&self) -> Vec<MarkerId> {
        self.active.keys().cloned().collect()
    }

    /// Current `{id -> state}` map, used for flush-on-shutdown.
    pub fn snapshot_all(&self) -> HashMap<MarkerId, TimerState> {
        self.active
            .iter()
            .map(|(id, timer)| (id.clone(), timer.state.clone()))
            .collect()
    }

    /// Stop every active timer (full shutdown).
    pub fn clear(&mut self) {
        for (_, timer) in self.active.drain() {
            timer.ticker.abort();
        }
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}
