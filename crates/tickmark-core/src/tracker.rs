//! Action facade over the accrual engine, registry, document sync and
//! ledger.
//!
//! Every entry point is a serialized command on the in-memory state;
//! persistence is issued after the transition completes and every write
//! carries the full current state, so an overlapping in-flight write is
//! harmless. Failures never raise into the scheduler -- they convert into
//! a local decision: skip this cycle, stop this timer, reject this input.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::{AutoStopPolicy, TrackerConfig};
use crate::document::{DocumentHandle, DocumentSync, Location};
use crate::error::{CoreError, DocumentError, Result};
use crate::ledger::{AnalyticsLedger, LedgerEntry, LedgerStore};
use crate::marker::{IdGenerator, MarkerId};
use crate::timer::{apply, Action, TimerRegistry, TimerState};

/// Result of one action entry point.
///
/// `persisted == false` means the in-memory transition completed but the
/// document or ledger write did not: memory and storage have diverged and
/// the caller gets to see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    /// Resulting state; `None` once the timer is gone (delete, auto-stop).
    pub state: Option<TimerState>,
    pub persisted: bool,
    /// Seconds appended to the ledger by this action.
    pub flushed_secs: u64,
}

impl ActionOutcome {
    fn noop() -> Self {
        Self {
            state: None,
            persisted: true,
            flushed_secs: 0,
        }
    }
}

/// Last known flush context for a timer: where it lives and which tags
/// were on its line at the last successful write. Used for the best-effort
/// final flush when the marker itself is no longer reachable.
#[derive(Debug, Clone)]
struct FlushContext {
    file: String,
    tags: Vec<String>,
}

/// One engine instance owning the whole per-process timer lifecycle.
///
/// Explicitly owned, not a singleton: tests run several independent
/// trackers side by side.
pub struct TimeTracker {
    config: TrackerConfig,
    clock: Arc<dyn Clock>,
    registry: TimerRegistry,
    sync: DocumentSync,
    ledger: AnalyticsLedger,
    ids: IdGenerator,
    contexts: HashMap<MarkerId, FlushContext>,
}

impl TimeTracker {
    pub fn new(
        config: TrackerConfig,
        clock: Arc<dyn Clock>,
        ledger_store: Box<dyn LedgerStore>,
    ) -> Self {
        let ledger = AnalyticsLedger::new(ledger_store, config.retention_days, clock.clone());
        let registry = TimerRegistry::new(Duration::from_secs(config.tick_period_secs.max(1)));
        let sync = DocumentSync::new(config.insert_position);
        Self {
            config,
            clock,
            registry,
            sync,
            ledger,
            ids: IdGenerator::new(),
            contexts: HashMap::new(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn ledger(&self) -> &AnalyticsLedger {
        &self.ledger
    }

    pub fn registry(&self) -> &TimerRegistry {
        &self.registry
    }

    /// The channel the host's run loop drains, calling [`on_tick`] per
    /// received id. Taken once.
    ///
    /// [`on_tick`]: TimeTracker::on_tick
    pub fn take_tick_receiver(&mut self) -> Option<UnboundedReceiver<MarkerId>> {
        self.registry.take_tick_receiver()
    }

    /// Decode every marker currently in the document.
    pub fn scan_markers(
        &self,
        doc: &mut DocumentHandle<'_>,
    ) -> Result<Vec<(TimerState, Location)>> {
        Ok(self.sync.scan_markers(doc)?)
    }

    // ── Action entry points ──────────────────────────────────────────

    /// Create a fresh timer and insert its marker on `line_index`.
    pub fn start(
        &mut self,
        doc: &mut DocumentHandle<'_>,
        doc_path: &str,
        line_index: usize,
    ) -> Result<ActionOutcome> {
        let now = self.now();
        let id = self.ids.next(self.clock.as_ref());
        let state = TimerState::start(id.clone(), now);
        // A bad insertion line is a caller error, not a divergence.
        let loc = self.sync.write_timer(doc, &state, Some(line_index))?;
        self.remember_context(doc, doc_path, &id, loc.line_index);
        self.registry.start_ticking(state.clone(), true);
        Ok(ActionOutcome {
            state: Some(state),
            persisted: true,
            flushed_secs: 0,
        })
    }

    /// Paused -> Running, no backfill.
    pub fn continue_timer(
        &mut self,
        doc: &mut DocumentHandle<'_>,
        doc_path: &str,
        id: &MarkerId,
    ) -> Result<ActionOutcome> {
        self.transition_to_running(doc, doc_path, id, Action::Continue, true)
    }

    /// Re-register a marker found in a reopened document, without
    /// crediting the downtime.
    pub fn restore(
        &mut self,
        doc: &mut DocumentHandle<'_>,
        doc_path: &str,
        id: &MarkerId,
    ) -> Result<ActionOutcome> {
        self.transition_to_running(doc, doc_path, id, Action::Restore, false)
    }

    /// Running -> Paused, crediting the capped elapsed gap and flushing
    /// the unflushed increment.
    pub fn pause(
        &mut self,
        doc: &mut DocumentHandle<'_>,
        doc_path: &str,
        id: &MarkerId,
    ) -> Result<ActionOutcome> {
        self.transition_to_paused(doc, doc_path, id, Action::Pause)
    }

    /// Stop without crediting time (policy decision while the host was
    /// unavailable).
    pub fn force_pause(
        &mut self,
        doc: &mut DocumentHandle<'_>,
        doc_path: &str,
        id: &MarkerId,
    ) -> Result<ActionOutcome> {
        self.transition_to_paused(doc, doc_path, id, Action::ForcePause)
    }

    /// Final flush, then remove the marker and drop all state for `id`.
    pub fn delete(
        &mut self,
        doc: &mut DocumentHandle<'_>,
        doc_path: &str,
        id: &MarkerId,
    ) -> Result<ActionOutcome> {
        let current = self.current_state(doc, id)?;
        let baseline = self
            .registry
            .flushed_secs(id)
            .unwrap_or(current.accumulated_secs);
        let (flushed_secs, ledger_ok) =
            self.flush_increment(id, current.accumulated_secs, baseline, doc_path);

        let removed = match self.sync.remove_timer(doc, id) {
            Ok(_) => true,
            Err(err) => {
                warn!(id = %id, error = %err, "marker removal failed; memory and document diverge");
                false
            }
        };
        self.registry.stop_ticking(id);
        self.contexts.remove(id);
        self.sync.forget(id);
        Ok(ActionOutcome {
            state: None,
            persisted: removed && ledger_ok,
            flushed_secs,
        })
    }

    /// One scheduler tick for `id`. Never returns an error: failures
    /// downgrade to a skipped cycle or an auto-stop.
    pub fn on_tick(
        &mut self,
        doc: &mut DocumentHandle<'_>,
        doc_path: &str,
        id: &MarkerId,
    ) -> ActionOutcome {
        let Some(current) = self.registry.state(id).cloned() else {
            // A tick raced a stop; nothing to do.
            return ActionOutcome::noop();
        };
        let now = self.now();
        let next = apply(Action::Tick, &current, now, &self.config.accrual);
        self.registry.update_state(id, next.clone());

        match self.sync.write_timer(doc, &next, None) {
            Ok(loc) => {
                self.remember_context(doc, doc_path, id, loc.line_index);
                ActionOutcome {
                    state: Some(next),
                    persisted: true,
                    flushed_secs: 0,
                }
            }
            Err(DocumentError::MarkerNotFound { .. }) => self.auto_stop(id, &next, doc_path),
            Err(err) => {
                // Routine storage hiccup: skip this cycle, keep running.
                debug!(id = %id, error = %err, "tick write skipped");
                ActionOutcome {
                    state: Some(next),
                    persisted: false,
                    flushed_secs: 0,
                }
            }
        }
    }

    /// Append the positive unflushed increment for one active timer.
    pub fn flush(
        &mut self,
        doc: &mut DocumentHandle<'_>,
        doc_path: &str,
        id: &MarkerId,
    ) -> ActionOutcome {
        let Some(state) = self.registry.state(id).cloned() else {
            return ActionOutcome::noop();
        };
        // Tags are captured at the moment of flush.
        if let Ok(Some(loc)) = self.sync.locate(doc, id) {
            self.remember_context(doc, doc_path, id, loc.line_index);
        }
        let baseline = self
            .registry
            .flushed_secs(id)
            .unwrap_or(state.accumulated_secs);
        let (flushed_secs, persisted) =
            self.flush_increment(id, state.accumulated_secs, baseline, doc_path);
        ActionOutcome {
            state: Some(state),
            persisted,
            flushed_secs,
        }
    }

    /// Flush every active timer from its last known context and stop the
    /// scheduler. Returns the per-id flushed seconds.
    pub fn shutdown(&mut self) -> Vec<(MarkerId, u64)> {
        let mut flushed = Vec::new();
        for (id, state) in self.registry.snapshot_all() {
            let baseline = self
                .registry
                .flushed_secs(&id)
                .unwrap_or(state.accumulated_secs);
            let file = self
                .contexts
                .get(&id)
                .map(|ctx| ctx.file.clone())
                .unwrap_or_else(|| crate::ledger::MANUAL_EDIT_FILE.to_string());
            let (secs, _) = self.flush_increment(&id, state.accumulated_secs, baseline, &file);
            if secs > 0 {
                flushed.push((id, secs));
            }
        }
        self.registry.clear();
        self.contexts.clear();
        flushed
    }

    // ── Internals ────────────────────────────────────────────────────

    fn now(&self) -> i64 {
        self.clock.epoch_secs()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.clock.epoch_secs(), 0).unwrap_or_default()
    }

    /// In-memory state if active, otherwise decoded from the document.
    fn current_state(
        &mut self,
        doc: &mut DocumentHandle<'_>,
        id: &MarkerId,
    ) -> Result<TimerState> {
        if let Some(state) = self.registry.state(id) {
            return Ok(state.clone());
        }
        match self.sync.read_state(doc, id)? {
            Some((state, _)) => Ok(state),
            None => Err(CoreError::Document(DocumentError::MarkerNotFound {
                id: id.to_string(),
            })),
        }
    }

    fn transition_to_running(
        &mut self,
        doc: &mut DocumentHandle<'_>,
        doc_path: &str,
        id: &MarkerId,
        action: Action,
        started_this_session: bool,
    ) -> Result<ActionOutcome> {
        let current = self.current_state(doc, id)?;
        let next = apply(action, &current, self.now(), &self.config.accrual);

        let persisted = match self.sync.write_timer(doc, &next, None) {
            Ok(loc) => {
                self.remember_context(doc, doc_path, id, loc.line_index);
                true
            }
            Err(err) => {
                warn!(id = %id, error = %err, "marker write failed; memory and document diverge");
                false
            }
        };
        if !self.registry.update_state(id, next.clone()) {
            self.registry.start_ticking(next.clone(), started_this_session);
        }
        Ok(ActionOutcome {
            state: Some(next),
            persisted,
            flushed_secs: 0,
        })
    }

    fn transition_to_paused(
        &mut self,
        doc: &mut DocumentHandle<'_>,
        doc_path: &str,
        id: &MarkerId,
        action: Action,
    ) -> Result<ActionOutcome> {
        let current = self.current_state(doc, id)?;
        let next = apply(action, &current, self.now(), &self.config.accrual);
        let baseline = self
            .registry
            .flushed_secs(id)
            .unwrap_or(current.accumulated_secs);

        let doc_ok = match self.sync.write_timer(doc, &next, None) {
            Ok(loc) => {
                self.remember_context(doc, doc_path, id, loc.line_index);
                true
            }
            Err(err) => {
                warn!(id = %id, error = %err, "marker write failed; memory and document diverge");
                false
            }
        };
        let (flushed_secs, ledger_ok) =
            self.flush_increment(id, next.accumulated_secs, baseline, doc_path);
        self.registry.stop_ticking(id);
        Ok(ActionOutcome {
            state: Some(next),
            persisted: doc_ok && ledger_ok,
            flushed_secs,
        })
    }

    /// Auto-stop a timer whose marker is gone after an exhaustive scan.
    fn auto_stop(&mut self, id: &MarkerId, state: &TimerState, doc_path: &str) -> ActionOutcome {
        warn!(id = %id, "marker no longer resolvable; stopping timer");
        let flushed_secs = match self.config.auto_stop {
            AutoStopPolicy::FlushFinal => {
                let baseline = self
                    .registry
                    .flushed_secs(id)
                    .unwrap_or(state.accumulated_secs);
                self.flush_increment(id, state.accumulated_secs, baseline, doc_path)
                    .0
            }
            AutoStopPolicy::Discard => 0,
        };
        self.registry.stop_ticking(id);
        self.contexts.remove(id);
        self.sync.forget(id);
        ActionOutcome {
            state: None,
            persisted: true,
            flushed_secs,
        }
    }

    /// Append one ledger entry for the increment since the last flush.
    /// Zero and negative increments append nothing.
    fn flush_increment(
        &mut self,
        id: &MarkerId,
        accumulated: u64,
        baseline: u64,
        fallback_file: &str,
    ) -> (u64, bool) {
        let increment = accumulated.saturating_sub(baseline);
        if increment == 0 {
            return (0, true);
        }
        let (file, tags) = match self.contexts.get(id) {
            Some(ctx) => (ctx.file.clone(), ctx.tags.clone()),
            None => (fallback_file.to_string(), Vec::new()),
        };
        let entry = LedgerEntry::normal(self.now_utc(), increment, file, tags);
        match self.ledger.append(entry) {
            Ok(()) => {
                self.registry.set_flushed_secs(id, accumulated);
                (increment, true)
            }
            Err(err) => {
                warn!(id = %id, error = %err, "ledger append failed; increment not recorded");
                (0, false)
            }
        }
    }

    fn remember_context(
        &mut self,
        doc: &mut DocumentHandle<'_>,
        doc_path: &str,
        id: &MarkerId,
        line_index: usize,
    ) {
        let tags = self.sync.line_tags(doc, line_index).unwrap_or_default();
        self.contexts.insert(
            id.clone(),
            FlushContext {
                file: doc_path.to_string(),
                tags,
            },
        );
    }
}
