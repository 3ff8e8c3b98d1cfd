//! Browser substrates.
//!
//! None of these types hold JS handles; each call looks up `window` again,
//! which keeps them `Send + Sync` and lets them degrade to the unavailable
//! mode inside workers or after the page tears down.

use super::{KeyValueSubstrate, LocationSubstrate};
use crate::context::SyncContext;
use crate::error::SubstrateError;
use crate::scheduler::{Scheduler, Task, TimerId};
use gloo_timers::callback::Timeout;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};

fn rejected(error: JsValue) -> SubstrateError {
    SubstrateError::Rejected(format!("{:?}", error))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StorageKind {
    Local,
    Session,
}

/// `localStorage` or `sessionStorage`.
pub struct WebStorage {
    kind: StorageKind,
}

impl WebStorage {
    pub fn local() -> Self {
        Self {
            kind: StorageKind::Local,
        }
    }

    pub fn session() -> Self {
        Self {
            kind: StorageKind::Session,
        }
    }

    fn storage(&self) -> Option<web_sys::Storage> {
        let window = web_sys::window()?;
        let storage = match self.kind {
            StorageKind::Local => window.local_storage(),
            StorageKind::Session => window.session_storage(),
        };
        storage.ok().flatten()
    }
}

impl KeyValueSubstrate for WebStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.storage()?.get_item(key).ok().flatten()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), SubstrateError> {
        let storage = self.storage().ok_or(SubstrateError::Unavailable)?;
        storage.set_item(key, value).map_err(|error| {
            let message = format!("{:?}", error);
            if message.contains("QuotaExceeded") {
                // Browsers do not report the limit
                SubstrateError::QuotaExceeded {
                    key: key.to_string(),
                    limit: 0,
                }
            } else {
                SubstrateError::Rejected(message)
            }
        })
    }
}

/// `window.location` with `history.pushState` / `replaceState`.
pub struct WebLocation;

impl WebLocation {
    fn write(&self, search: &str, push: bool) -> Result<(), SubstrateError> {
        let window = web_sys::window().ok_or(SubstrateError::Unavailable)?;
        let location = window.location();
        let path = location.pathname().map_err(rejected)?;
        let hash = location.hash().map_err(rejected)?;

        let url = if search.is_empty() {
            format!("{}{}", path, hash)
        } else {
            format!("{}?{}{}", path, search, hash)
        };

        let history = window.history().map_err(rejected)?;
        let result = if push {
            history.push_state_with_url(&JsValue::NULL, "", Some(&url))
        } else {
            history.replace_state_with_url(&JsValue::NULL, "", Some(&url))
        };
        result.map_err(rejected)
    }
}

impl LocationSubstrate for WebLocation {
    fn search(&self) -> String {
        web_sys::window()
            .and_then(|window| window.location().search().ok())
            .map(|search| search.trim_start_matches('?').to_string())
            .unwrap_or_default()
    }

    fn push(&self, search: &str) -> Result<(), SubstrateError> {
        self.write(search, true)
    }

    fn replace(&self, search: &str) -> Result<(), SubstrateError> {
        self.write(search, false)
    }
}

thread_local! {
    static TIMERS: RefCell<HashMap<u64, Timeout>> = RefCell::new(HashMap::new());
    static FIRED: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Drop handles of timers that already ran. Never called from inside the
/// timer being dropped.
fn purge_fired() {
    let fired = FIRED.with(|fired| std::mem::take(&mut *fired.borrow_mut()));
    if fired.is_empty() {
        return;
    }
    TIMERS.with(|timers| {
        let mut timers = timers.borrow_mut();
        for id in fired {
            timers.remove(&id);
        }
    });
}

/// `setTimeout`-based scheduler.
#[derive(Default)]
pub struct BrowserScheduler {
    next_id: AtomicU64,
}

impl BrowserScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for BrowserScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        purge_fired();

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let millis = u32::try_from(delay.as_millis()).unwrap_or(u32::MAX);
        let timeout = Timeout::new(millis, move || {
            task();
            FIRED.with(|fired| fired.borrow_mut().push(id));
        });

        TIMERS.with(|timers| timers.borrow_mut().insert(id, timeout));
        TimerId(id)
    }

    fn cancel(&self, id: TimerId) {
        // Dropping a Timeout clears it
        TIMERS.with(|timers| timers.borrow_mut().remove(&id.0));
    }
}

/// Forward `popstate` events to `ctx.notify_navigation()` for the life of
/// the page.
pub fn install_popstate_hook(ctx: &SyncContext) -> Result<(), SubstrateError> {
    let window = web_sys::window().ok_or(SubstrateError::Unavailable)?;
    let ctx = ctx.clone();
    let closure = Closure::<dyn FnMut()>::new(move || ctx.notify_navigation());

    window
        .add_event_listener_with_callback("popstate", closure.as_ref().unchecked_ref())
        .map_err(rejected)?;
    closure.forget();
    Ok(())
}
