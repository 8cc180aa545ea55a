// ── LiveData facade ──
//
// Entry point for consumers: owns the backends, one cache registry per value
// type, and hands out bindings.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::binding::Binding;
use crate::cache::CacheRegistry;
use crate::config::CacheConfig;
use crate::model::{Query, User};
use crate::source::{AuthBackend, AuthProvider, DataProvider, DatabaseBackend, DatabaseProvider};

/// Cheaply cloneable handle to the auth and database caches.
#[derive(Clone)]
pub struct LiveData {
    inner: Arc<LiveDataInner>,
}

struct LiveDataInner {
    config: CacheConfig,
    auth_backend: Arc<dyn AuthBackend>,
    database_backend: Arc<dyn DatabaseBackend>,
    auth_cache: CacheRegistry<Option<User>>,
    database_cache: CacheRegistry<Value>,
}

impl LiveData {
    pub fn new(
        config: CacheConfig,
        auth_backend: Arc<dyn AuthBackend>,
        database_backend: Arc<dyn DatabaseBackend>,
    ) -> Self {
        debug!(database_url = %config.database_url, "creating live data caches");
        Self {
            inner: Arc::new(LiveDataInner {
                auth_cache: CacheRegistry::new(config.clone()),
                database_cache: CacheRegistry::new(config.clone()),
                config,
                auth_backend,
                database_backend,
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    // ── Bindings ─────────────────────────────────────────────────────

    /// Bind to the auth stream. The state's data is `None` while signed out.
    pub fn auth(&self) -> Binding<Option<User>> {
        Binding::new(self.inner.auth_cache.clone(), self.auth_provider())
    }

    /// Bind to the value of `query`.
    pub fn database(&self, query: Query) -> Binding<Value> {
        Binding::new(
            self.inner.database_cache.clone(),
            self.database_provider(query),
        )
    }

    // ── Providers ────────────────────────────────────────────────────

    pub fn auth_provider(&self) -> Arc<dyn DataProvider<Value = Option<User>>> {
        Arc::new(AuthProvider::new(Arc::clone(&self.inner.auth_backend)))
    }

    /// Provider for `query`, e.g. to [`retarget`](Binding::retarget) a
    /// database binding.
    pub fn database_provider(&self, query: Query) -> Arc<dyn DataProvider<Value = Value>> {
        Arc::new(DatabaseProvider::new(
            Arc::clone(&self.inner.database_backend),
            query,
            &self.inner.config.database_url,
        ))
    }

    // ── Caches ───────────────────────────────────────────────────────

    pub fn auth_cache(&self) -> &CacheRegistry<Option<User>> {
        &self.inner.auth_cache
    }

    pub fn database_cache(&self) -> &CacheRegistry<Value> {
        &self.inner.database_cache
    }

    /// Empty both caches.
    pub fn clear(&self) {
        self.inner.auth_cache.clear();
        self.inner.database_cache.clear();
    }
}
