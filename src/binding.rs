//! A store bound to its persistence backends.
//!
//! Lifecycle: `bind` reserves the name, resolves persisted values into the
//! store, seeds the change tracker and subscribes. From then on every
//! transition runs through the tracker, and dirty ones arm the debounced
//! flush. `destroy` (or dropping the [`BoundStore`]) releases the
//! subscription, the navigation listener and any pending timer; a binding
//! never comes back from that.

use crate::codec::Codec;
use crate::config::BindOptions;
use crate::context::SyncContext;
use crate::error::Result;
use crate::events::SyncEvent;
use crate::flusher::{Debouncer, FlushReport, FlushTarget, PendingFlush};
use crate::navigation::ListenerId;
use crate::reactive::{ReactiveStore, StoreListener, SubscriptionId};
use crate::resolver;
use crate::tracker::ChangeTracker;
use crate::types::{Backend, KeySet, KeySets, Snapshot, StoreName};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

struct BindingState {
    tracker: ChangeTracker,
    debouncer: Debouncer,
    subscription: Option<SubscriptionId>,
    listener: Option<ListenerId>,
}

struct Binding<S: ReactiveStore> {
    name: StoreName,
    key_sets: KeySets,
    options: BindOptions,
    codec: Codec,
    /// Store state before persisted values were applied.
    defaults: Snapshot,
    store: Arc<S>,
    ctx: SyncContext,
    /// Cleared by `destroy`; checked before every backend write.
    alive: AtomicBool,
    state: Mutex<BindingState>,
}

impl<S: ReactiveStore> Binding<S> {
    fn flush_target(&self) -> FlushTarget<'_> {
        FlushTarget {
            name: &self.name,
            key_sets: &self.key_sets,
            codec: &self.codec,
            adapters: &self.ctx.inner.adapters,
            events: &self.ctx.inner.events,
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Store subscription callback.
    fn on_transition(self: &Arc<Self>, next: &Snapshot) {
        if !self.is_alive() {
            return;
        }

        let (generation, superseded, delay) = {
            let mut state = self.state.lock();
            let changes = state.tracker.observe(next);
            if changes.is_clean() {
                trace!(name = %self.name, "Transition touches no persisted key");
                return;
            }
            trace!(name = %self.name, dirty = ?changes.dirty, "Arming flush");
            let (generation, superseded) = state.debouncer.arm(changes);
            (generation, superseded, state.debouncer.delay())
        };

        let scheduler = &self.ctx.inner.scheduler;
        if let Some(timer) = superseded {
            scheduler.cancel(timer);
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let timer = scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(binding) = weak.upgrade() {
                    binding.fire(generation);
                }
            }),
        );
        self.state.lock().debouncer.set_timer(generation, timer);
    }

    /// Timer callback.
    fn fire(&self, generation: u64) {
        let mut state = self.state.lock();
        if !self.is_alive() {
            trace!(name = %self.name, "Ignoring timer for destroyed binding");
            return;
        }
        let Some(pending) = state.debouncer.take_if_current(generation) else {
            return;
        };

        let current = self.store.get();
        self.flush_target()
            .flush(&mut state.tracker, &current, &pending);
    }

    fn flush_now(&self) -> FlushReport {
        let mut state = self.state.lock();
        if !self.is_alive() {
            return FlushReport::default();
        }

        let pending = state.debouncer.take();
        if let Some(timer) = pending.as_ref().and_then(|p| p.timer) {
            self.ctx.inner.scheduler.cancel(timer);
        }

        let current = self.store.get();
        let changes = state.tracker.observe(&current);
        if changes.is_clean() {
            return FlushReport::default();
        }

        let pending = PendingFlush {
            generation: 0,
            dirty: changes.dirty,
            navigation_significant: pending
                .map(|p| p.navigation_significant)
                .unwrap_or(changes.navigation_significant),
            timer: None,
        };
        self.flush_target()
            .flush(&mut state.tracker, &current, &pending)
    }

    /// Navigation listener callback: re-read the navigation keys.
    fn resync(&self) {
        if !self.is_alive() {
            return;
        }
        let Some(keys) = self.key_sets.get(Backend::Navigation) else {
            return;
        };

        let fresh = self.ctx.inner.adapters.navigation.read(&self.name, keys);

        // A key missing from the address falls back to its default, or to
        // undefined when it has none.
        let restored: Snapshot = keys
            .iter()
            .filter_map(|key| {
                fresh
                    .get(key)
                    .or_else(|| self.defaults.get(key))
                    .map(|value| (key.to_string(), value.clone()))
            })
            .collect();

        // The address already holds `restored`; make the tracker agree so
        // the transition below does not write it back.
        self.state
            .lock()
            .tracker
            .commit(Backend::Navigation, restored.clone());

        let current = self.store.get();
        let mut updates = Snapshot::new();
        let mut cleared = Vec::new();
        for key in keys.iter() {
            match restored.get(key) {
                Some(value) if current.get(key) != Some(value) => {
                    updates.insert(key, value.clone());
                }
                None if current.contains_key(key) => cleared.push(key.to_string()),
                _ => {}
            }
        }

        if updates.is_empty() && cleared.is_empty() {
            trace!(name = %self.name, "Navigation left store unchanged");
            return;
        }

        let mut changed: Vec<String> = updates
            .keys()
            .map(str::to_string)
            .chain(cleared.iter().cloned())
            .collect();
        changed.sort();
        debug!(name = %self.name, keys = ?changed, "Resynced from navigation");
        self.store.patch(updates, &KeySet::of(cleared));
        self.ctx.inner.events.publish(SyncEvent::Resynced {
            name: self.name.clone(),
            keys: changed,
        });
    }

    fn destroy(&self) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }

        let (subscription, listener, timer) = {
            let mut state = self.state.lock();
            (
                state.subscription.take(),
                state.listener.take(),
                state.debouncer.take().and_then(|p| p.timer),
            )
        };

        if let Some(id) = subscription {
            self.store.unsubscribe(id);
        }
        if let Some(id) = listener {
            self.ctx.inner.navigation.unregister(id);
        }
        if let Some(timer) = timer {
            self.ctx.inner.scheduler.cancel(timer);
        }

        debug!(name = %self.name, "Destroyed binding");
        self.ctx.inner.events.publish(SyncEvent::Destroyed {
            name: self.name.clone(),
        });
    }
}

/// A reactive store kept in sync with its declared backends.
pub struct BoundStore<S: ReactiveStore> {
    binding: Arc<Binding<S>>,
}

impl<S: ReactiveStore> BoundStore<S> {
    /// Bind `store` under `name`.
    ///
    /// Fails only with `SyncError::BindingConflict`, before the store is
    /// touched.
    pub(crate) fn bind(
        ctx: &SyncContext,
        name: StoreName,
        key_sets: KeySets,
        store: Arc<S>,
        options: BindOptions,
    ) -> Result<Self> {
        ctx.inner.registry.claim(&name, &key_sets)?;

        let defaults = store.get();
        let resolved = resolver::resolve(&ctx.inner.adapters, &name, &key_sets, &options.priority);
        if !resolved.is_empty() {
            store.set(resolved);
        }

        let mut tracker = ChangeTracker::new(key_sets.clone(), &options.history_keys());
        tracker.seed(&store.get());
        let listens = key_sets.get(Backend::Navigation).is_some() && !tracker.history_keys().is_empty();

        let binding = Arc::new(Binding {
            codec: Codec::new(options.binary_encoding.clone()),
            name,
            key_sets,
            defaults,
            store,
            ctx: ctx.clone(),
            alive: AtomicBool::new(true),
            state: Mutex::new(BindingState {
                tracker,
                debouncer: Debouncer::new(options.flush_delay()),
                subscription: None,
                listener: None,
            }),
            options,
        });

        let weak = Arc::downgrade(&binding);
        let listener: StoreListener = Arc::new(move |next, _previous| {
            if let Some(binding) = weak.upgrade() {
                binding.on_transition(next);
            }
        });
        let subscription = binding.store.subscribe(listener);

        let listener = if listens {
            let weak = Arc::downgrade(&binding);
            Some(ctx.inner.navigation.register(Arc::new(move || {
                if let Some(binding) = weak.upgrade() {
                    binding.resync();
                }
            })))
        } else {
            None
        };

        {
            let mut state = binding.state.lock();
            state.subscription = Some(subscription);
            state.listener = listener;
        }

        debug!(
            name = %binding.name,
            backends = ?binding.key_sets.declared().map(|(b, _)| b).collect::<Vec<_>>(),
            listens,
            "Bound store"
        );
        ctx.inner.events.publish(SyncEvent::Bound {
            name: binding.name.clone(),
        });

        Ok(Self { binding })
    }

    /// Name the store persists under.
    pub fn name(&self) -> &StoreName {
        &self.binding.name
    }

    /// Keys declared per backend.
    pub fn key_sets(&self) -> &KeySets {
        &self.binding.key_sets
    }

    /// Options the store was bound with.
    pub fn options(&self) -> &BindOptions {
        &self.binding.options
    }

    /// The wrapped store.
    pub fn store(&self) -> &Arc<S> {
        &self.binding.store
    }

    /// Current state of the wrapped store.
    pub fn get(&self) -> Snapshot {
        self.binding.store.get()
    }

    /// Merge `partial` into the wrapped store.
    pub fn set(&self, partial: Snapshot) {
        self.binding.store.set(partial);
    }

    /// Subscribe to the wrapped store.
    pub fn subscribe(&self, listener: StoreListener) -> SubscriptionId {
        self.binding.store.subscribe(listener)
    }

    /// Remove a subscription made through [`BoundStore::subscribe`].
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.binding.store.unsubscribe(id);
    }

    /// True while a debounced flush is armed.
    pub fn has_pending_flush(&self) -> bool {
        self.binding.state.lock().debouncer.is_pending()
    }

    /// Write out pending changes now instead of waiting for the timer.
    pub fn flush_now(&self) -> FlushReport {
        self.binding.flush_now()
    }

    /// True once `destroy` ran.
    pub fn is_destroyed(&self) -> bool {
        !self.binding.is_alive()
    }

    /// Tear down. Later transitions never reach a backend. The name stays
    /// reserved.
    pub fn destroy(&self) {
        self.binding.destroy();
    }
}

impl<S: ReactiveStore> Drop for BoundStore<S> {
    fn drop(&mut self) {
        self.binding.destroy();
    }
}
