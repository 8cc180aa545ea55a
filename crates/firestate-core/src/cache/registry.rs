// ── Cache registry ──
//
// Table of live cache entries keyed by provider cache key. Entries remove
// themselves through the eviction callback installed here.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use super::entry::CacheEntry;
use crate::config::CacheConfig;
use crate::source::DataProvider;

/// Registry of cache entries for one value type.
///
/// Cheaply cloneable; clones share the same table. Constructed explicitly
/// and passed to whoever needs it.
pub struct CacheRegistry<T: Clone + Send + Sync + 'static> {
    inner: Arc<RegistryInner<T>>,
}

struct RegistryInner<T: Clone + Send + Sync + 'static> {
    entries: DashMap<String, Arc<CacheEntry<T>>>,
    config: CacheConfig,
}

impl<T: Clone + Send + Sync + 'static> Clone for CacheRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> CacheRegistry<T> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: DashMap::new(),
                config,
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// The live entry for `provider`'s cache key, created on first use.
    ///
    /// While an entry is alive, every provider with the same key gets the
    /// same `Arc`.
    pub fn entry(&self, provider: Arc<dyn DataProvider<Value = T>>) -> Arc<CacheEntry<T>> {
        let key = provider.cache_key().to_owned();
        if let Some(existing) = self.inner.entries.get(&key) {
            return Arc::clone(existing.value());
        }

        match self.inner.entries.entry(key.clone()) {
            Entry::Occupied(occupied) => Arc::clone(occupied.get()),
            Entry::Vacant(vacant) => {
                debug!(key = %key, "creating cache entry");
                let table = Arc::downgrade(&self.inner);
                let entry = CacheEntry::new(
                    provider,
                    self.inner.config.release_delay,
                    Box::new(move |evicted: &CacheEntry<T>| {
                        let Some(table) = table.upgrade() else {
                            return;
                        };
                        // A newer entry may already live under this key.
                        table
                            .entries
                            .remove_if(&key, |_, current| std::ptr::eq(current.as_ref(), evicted));
                    }),
                );
                vacant.insert(Arc::clone(&entry));
                entry
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry<T>>> {
        self.inner.entries.get(key).map(|e| Arc::clone(e.value()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// All live cache keys.
    pub fn keys(&self) -> Vec<String> {
        self.inner.entries.iter().map(|r| r.key().clone()).collect()
    }

    /// Drop every entry. Dropped entries release their upstream
    /// subscriptions once no consumer holds them.
    pub fn clear(&self) {
        let drained: Vec<Arc<CacheEntry<T>>> = self
            .inner
            .entries
            .iter()
            .map(|r| Arc::clone(r.value()))
            .collect();
        self.inner.entries.clear();
        debug!(entries = drained.len(), "cleared cache registry");
        drop(drained);
    }
}
