//! # Store Sync
//!
//! Keeps an in-memory reactive store in sync with up to three independent
//! persistence backends:
//!
//! - **Navigation**: the address-bar query string, one parameter per store
//! - **Durable**: per-origin storage that survives restarts
//! - **Session**: storage cleared when the session ends
//!
//! Each backend is declared per store with the subset of fields it owns.
//! At bind time persisted values are merged into the store by a
//! configurable backend priority; afterwards every state transition is
//! checked per backend, and changed backends are written after a debounce
//! window. Back/forward navigation re-reads the query string.
//!
//! ## Example
//!
//! ```ignore
//! use store_sync::{BindOptions, KeySets, MemoryLocation, Snapshot, SyncContext};
//!
//! let location = Arc::new(MemoryLocation::new());
//! let ctx = SyncContext::builder().location(location.clone()).build();
//!
//! let filters = ctx.bind(
//!     "filters",
//!     KeySets::new().navigation(["category"]),
//!     Snapshot::from_value(json!({"category": "all"})).unwrap(),
//!     BindOptions::default(),
//! )?;
//!
//! filters.set(Snapshot::from_value(json!({"category": "electronics"})).unwrap());
//! filters.flush_now();
//! // location.search() == "filters=%7B%22category%22%3A%22electronics%22%7D"
//! ```

pub mod adapters;
pub mod binding;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod flusher;
pub mod navigation;
pub mod reactive;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod substrate;
pub mod tracker;
pub mod types;

// Re-exports
pub use adapters::{Adapters, NavigationAdapter, QueryCache, QueryParams, StorageAdapter, WriteOutcome};
pub use binding::BoundStore;
pub use codec::{Codec, Encoded};
pub use config::{BindOptions, EncodingOptions, SyncConfig};
pub use context::{SyncContext, SyncContextBuilder};
pub use error::{Result, SubstrateError, SyncError};
pub use events::{EventBus, EventSubscription, SyncEvent};
pub use flusher::{Debouncer, FlushReport, PendingFlush};
pub use navigation::{ListenerId, NavigationHub};
pub use reactive::{MemoryStore, ReactiveStore, StoreListener, SubscriptionId};
pub use registry::Registry;
pub use scheduler::{ManualScheduler, Scheduler, Task, TimerId};
pub use substrate::{FileStorage, KeyValueSubstrate, LocationSubstrate, MemoryLocation, MemoryStorage};
pub use tracker::{ChangeSet, ChangeTracker};
pub use types::*;
