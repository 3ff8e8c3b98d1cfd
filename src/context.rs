//! Shared engine context.
//!
//! Everything a browser implementation would keep in module-level globals
//! (bound names, the parsed-query cache, navigation listeners) lives here
//! instead, so independent contexts never see each other's state and tests
//! can start from a clean slate.

use crate::adapters::{Adapters, NavigationAdapter, QueryCache, StorageAdapter};
use crate::binding::BoundStore;
use crate::config::{BindOptions, SyncConfig};
use crate::error::Result;
use crate::events::{EventBus, EventSubscription};
use crate::navigation::NavigationHub;
use crate::reactive::{MemoryStore, ReactiveStore};
use crate::registry::Registry;
use crate::scheduler::{ManualScheduler, Scheduler};
use crate::substrate::{KeyValueSubstrate, LocationSubstrate};
use crate::types::{Backend, KeySets, Snapshot, StoreName};
use std::sync::Arc;
use tracing::debug;

pub(crate) struct ContextInner {
    pub(crate) registry: Registry,
    pub(crate) adapters: Adapters,
    pub(crate) navigation: NavigationHub,
    pub(crate) events: EventBus,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) cache: Arc<QueryCache>,
}

/// Handle to an engine context. Clones share the same state.
#[derive(Clone)]
pub struct SyncContext {
    pub(crate) inner: Arc<ContextInner>,
}

/// Builder for [`SyncContext`].
pub struct SyncContextBuilder {
    config: SyncConfig,
    location: Option<Arc<dyn LocationSubstrate>>,
    durable: Option<Arc<dyn KeyValueSubstrate>>,
    session: Option<Arc<dyn KeyValueSubstrate>>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl SyncContextBuilder {
    /// Context-wide configuration.
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Substrate for the navigation backend.
    pub fn location(mut self, location: Arc<dyn LocationSubstrate>) -> Self {
        self.location = Some(location);
        self
    }

    /// Substrate for the durable backend.
    pub fn durable(mut self, storage: Arc<dyn KeyValueSubstrate>) -> Self {
        self.durable = Some(storage);
        self
    }

    /// Substrate for the session backend.
    pub fn session(mut self, storage: Arc<dyn KeyValueSubstrate>) -> Self {
        self.session = Some(storage);
        self
    }

    /// Timer facility. Defaults to a [`ManualScheduler`] nobody drives,
    /// so flushes only happen through `BoundStore::flush_now`.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Create the context. Missing substrates leave their backend unavailable.
    pub fn build(self) -> SyncContext {
        let cache = Arc::new(QueryCache::new(self.config.query_cache_capacity));
        let adapters = Adapters {
            navigation: NavigationAdapter::new(self.location, Arc::clone(&cache)),
            durable: StorageAdapter::new(Backend::Durable, self.durable),
            session: StorageAdapter::new(Backend::Session, self.session),
        };

        debug!(
            navigation = adapters.navigation.is_available(),
            durable = adapters.durable.is_available(),
            session = adapters.session.is_available(),
            "Built sync context"
        );

        SyncContext {
            inner: Arc::new(ContextInner {
                registry: Registry::new(),
                adapters,
                navigation: NavigationHub::new(),
                events: EventBus::new(self.config.event_buffer_size),
                scheduler: self
                    .scheduler
                    .unwrap_or_else(|| Arc::new(ManualScheduler::new())),
                cache,
            }),
        }
    }
}

impl SyncContext {
    /// Start building a context.
    pub fn builder() -> SyncContextBuilder {
        SyncContextBuilder {
            config: SyncConfig::default(),
            location: None,
            durable: None,
            session: None,
            scheduler: None,
        }
    }

    /// A context with no host substrates: reads are empty, writes are skipped.
    pub fn detached() -> Self {
        Self::builder().build()
    }

    /// Bind a new [`MemoryStore`] holding `initial`.
    pub fn bind(
        &self,
        name: impl Into<StoreName>,
        key_sets: KeySets,
        initial: Snapshot,
        options: BindOptions,
    ) -> Result<BoundStore<MemoryStore>> {
        BoundStore::bind(
            self,
            name.into(),
            key_sets,
            Arc::new(MemoryStore::new(initial)),
            options,
        )
    }

    /// Bind an existing store. Its current state is the initializer default.
    pub fn bind_store<S: ReactiveStore>(
        &self,
        name: impl Into<StoreName>,
        key_sets: KeySets,
        store: Arc<S>,
        options: BindOptions,
    ) -> Result<BoundStore<S>> {
        BoundStore::bind(self, name.into(), key_sets, store, options)
    }

    /// Report an external back/forward navigation.
    ///
    /// Drops cached query parses, then lets every listening binding re-read
    /// its navigation keys.
    pub fn notify_navigation(&self) {
        self.inner.adapters.navigation.invalidate();
        self.inner.navigation.dispatch();
    }

    /// Subscribe to engine events.
    pub fn subscribe_events(&self) -> EventSubscription {
        self.inner.events.subscribe()
    }

    /// Stop delivering events to `subscription`.
    pub fn unsubscribe_events(&self, subscription: &EventSubscription) {
        self.inner.events.unsubscribe(subscription.id);
    }

    /// Whether `name` is reserved in `backend`.
    pub fn is_bound(&self, name: &StoreName, backend: Backend) -> bool {
        self.inner.registry.is_bound(name, backend)
    }

    /// Number of bindings currently listening for navigation.
    pub fn navigation_listener_count(&self) -> usize {
        self.inner.navigation.listener_count()
    }

    /// Parses performed by the shared query cache.
    pub fn query_parse_count(&self) -> u64 {
        self.inner.cache.parse_count()
    }

    /// Release all reserved names and drop cached parses.
    pub fn reset(&self) {
        self.inner.registry.clear();
        self.inner.cache.invalidate();
    }
}
