// ── Runtime cache configuration ──
//
// Describes how the cache layer behaves. Core never reads config files;
// `firestate-config` (or any caller) builds a `CacheConfig` and hands it in.

use std::time::Duration;

/// Base URL used when none is configured.
pub const DEFAULT_DATABASE_URL: &str = "http://localhost:9000";

/// Configuration shared by every cache registry owned by a `LiveData`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a cache entry with no subscribers keeps its upstream
    /// subscription open. Zero means "until the next scheduler tick".
    pub release_delay: Duration,
    /// Database root URL, used to build the canonical string of a query.
    pub database_url: String,
}

impl CacheConfig {
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_release_delay(mut self, delay: Duration) -> Self {
        self.release_delay = delay;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            release_delay: Duration::ZERO,
            database_url: DEFAULT_DATABASE_URL.into(),
        }
    }
}
