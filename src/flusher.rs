//! Debounced multi-backend writes.
//!
//! Every dirty transition re-arms a single pending flush. Only the newest
//! arming can fire: each carries a generation number, and a timer whose
//! generation is no longer current does nothing even if the host failed
//! to cancel it. When a flush fires it serializes the state current at
//! that moment, so intermediate values are never written.

use crate::adapters::{Adapters, WriteOutcome};
use crate::codec::Codec;
use crate::events::{EventBus, SyncEvent};
use crate::scheduler::TimerId;
use crate::tracker::{ChangeSet, ChangeTracker};
use crate::types::{Backend, HistoryMode, KeySets, Snapshot, StoreName};
use std::time::Duration;
use tracing::debug;

/// A flush waiting for its timer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingFlush {
    pub generation: u64,
    /// Backends dirty when the flush was armed.
    pub dirty: Vec<Backend>,
    /// Significance of the transition that armed this flush.
    pub navigation_significant: bool,
    /// Host timer, once scheduled.
    pub timer: Option<TimerId>,
}

/// Single-slot debounce state.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    generation: u64,
    pending: Option<PendingFlush>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: 0,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Replace any pending flush with one for `changes`.
    ///
    /// Returns the new generation and the superseded timer, which the
    /// caller should cancel.
    pub fn arm(&mut self, changes: ChangeSet) -> (u64, Option<TimerId>) {
        self.generation += 1;
        let superseded = self.pending.take().and_then(|p| p.timer);
        self.pending = Some(PendingFlush {
            generation: self.generation,
            dirty: changes.dirty,
            navigation_significant: changes.navigation_significant,
            timer: None,
        });
        (self.generation, superseded)
    }

    /// Attach the host timer to the pending flush of `generation`.
    pub fn set_timer(&mut self, generation: u64, timer: TimerId) -> bool {
        match self.pending.as_mut() {
            Some(pending) if pending.generation == generation => {
                pending.timer = Some(timer);
                true
            }
            _ => false,
        }
    }

    /// Take the pending flush if `generation` is still the current one.
    pub fn take_if_current(&mut self, generation: u64) -> Option<PendingFlush> {
        if self.pending.as_ref()?.generation != generation {
            return None;
        }
        self.pending.take()
    }

    /// Take whatever is pending, regardless of generation.
    pub fn take(&mut self) -> Option<PendingFlush> {
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// What one flush did, per backend, in write order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub outcomes: Vec<(Backend, WriteOutcome)>,
}

impl FlushReport {
    pub fn outcome(&self, backend: Backend) -> Option<&WriteOutcome> {
        self.outcomes
            .iter()
            .find(|(b, _)| *b == backend)
            .map(|(_, outcome)| outcome)
    }

    pub fn written(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_written()).count()
    }
}

/// Everything a flush needs to reach the backends of one binding.
pub struct FlushTarget<'a> {
    pub name: &'a StoreName,
    pub key_sets: &'a KeySets,
    pub codec: &'a Codec,
    pub adapters: &'a Adapters,
    pub events: &'a EventBus,
}

impl FlushTarget<'_> {
    /// Write `state` to each backend in `pending.dirty`, advancing the
    /// tracker for every backend that now holds the value.
    ///
    /// Failed writes leave the tracker alone so the next change retries.
    pub fn flush(
        &self,
        tracker: &mut ChangeTracker,
        state: &Snapshot,
        pending: &PendingFlush,
    ) -> FlushReport {
        let mut report = FlushReport::default();
        let mode = HistoryMode::from_significance(pending.navigation_significant);

        for &backend in &pending.dirty {
            let Some(keys) = self.key_sets.get(backend) else {
                continue;
            };
            let prior = tracker.prior(backend);

            let outcome = match backend {
                Backend::Navigation => self
                    .adapters
                    .navigation
                    .write(self.name, keys, state, prior, self.codec, mode),
                Backend::Durable => self.adapters.durable.write(self.name, keys, state, prior),
                Backend::Session => self.adapters.session.write(self.name, keys, state, prior),
            };

            match &outcome {
                WriteOutcome::Written { encoded, .. } => {
                    tracker.commit(backend, state.project(keys));
                    self.events.publish(SyncEvent::Persisted {
                        name: self.name.clone(),
                        backend,
                        encoded: *encoded,
                    });
                }
                WriteOutcome::Unavailable => tracker.commit(backend, state.project(keys)),
                WriteOutcome::Unchanged => {}
                WriteOutcome::Failed(e) => self.events.publish(SyncEvent::WriteFailed {
                    name: self.name.clone(),
                    backend,
                    error: e.to_string(),
                }),
            }

            report.outcomes.push((backend, outcome));
        }

        debug!(
            name = %self.name,
            backends = report.outcomes.len(),
            written = report.written(),
            ?mode,
            "Flushed"
        );
        report
    }
}
