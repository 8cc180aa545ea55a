// ── Data sources ──
//
// The upstream boundary. Backends (`AuthBackend`, `DatabaseBackend`) are the
// external collaborators; providers adapt one endpoint of a backend into the
// uniform `DataProvider` shape the cache layer consumes.

mod auth;
mod database;

use std::fmt;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;

use crate::error::DataError;
use crate::model::{DataSnapshot, Query, User};

pub use auth::{AUTH_CACHE_KEY, AuthProvider};
pub use database::DatabaseProvider;

/// Callback for values delivered by an upstream stream.
pub type OnNext<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Callback for errors delivered by an upstream stream.
pub type OnError = Arc<dyn Fn(DataError) + Send + Sync>;

// ── Subscription ─────────────────────────────────────────────────────

/// Unsubscribe capability returned by every `subscribe`.
///
/// Cancelling is idempotent. Dropping a live subscription cancels it.
pub struct Subscription {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// A subscription with nothing to tear down.
    pub fn empty() -> Self {
        Self {
            cancel: Mutex::new(None),
        }
    }

    pub fn unsubscribe(&self) {
        let cancel = self
            .cancel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.lock().map(|c| c.is_some()).unwrap_or(false)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

// ── Provider contract ────────────────────────────────────────────────

/// One external live-data endpoint.
///
/// Providers with equal [`cache_key`](Self::cache_key) are treated as the
/// same logical stream and share one cache entry.
pub trait DataProvider: Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;

    fn cache_key(&self) -> &str;

    /// Fetch the current value once.
    fn load_once(&self) -> BoxFuture<'static, Result<Self::Value, DataError>>;

    /// Attach to the continuous stream of values.
    fn subscribe(&self, on_next: OnNext<Self::Value>, on_error: OnError) -> Subscription;
}

// ── Backend contracts ────────────────────────────────────────────────

/// Authentication service.
pub trait AuthBackend: Send + Sync + 'static {
    /// Register an auth-state listener. `None` means signed out.
    ///
    /// A backend may invoke `on_next` before this call returns.
    fn on_auth_state_changed(
        &self,
        on_next: OnNext<Option<User>>,
        on_error: OnError,
    ) -> Subscription;
}

/// Handle for one listener attached with [`DatabaseBackend::on_value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Realtime database service.
pub trait DatabaseBackend: Send + Sync + 'static {
    /// Attach a value listener to `query`.
    fn on_value(
        &self,
        query: &Query,
        on_next: OnNext<Option<DataSnapshot>>,
        on_error: OnError,
    ) -> ListenerId;

    /// Detach exactly the listener identified by `id`.
    fn off(&self, query: &Query, id: ListenerId);

    /// Fetch the current value of `query` once.
    fn get(&self, query: &Query) -> BoxFuture<'static, Result<Option<DataSnapshot>, DataError>>;
}
