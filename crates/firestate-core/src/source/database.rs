// ── Database query adapter ──

use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::trace;

use super::{DataProvider, DatabaseBackend, OnError, OnNext, Subscription};
use crate::error::DataError;
use crate::model::{DataSnapshot, Query};

/// Adapts one [`Query`] on a [`DatabaseBackend`] into a [`DataProvider`]
/// of its JSON value.
pub struct DatabaseProvider {
    backend: Arc<dyn DatabaseBackend>,
    query: Query,
    cache_key: String,
}

impl DatabaseProvider {
    /// `database_url` is the root the query's canonical string is built on.
    pub fn new(backend: Arc<dyn DatabaseBackend>, query: Query, database_url: &str) -> Self {
        let cache_key = cache_key_for(&query, database_url);
        Self {
            backend,
            query,
            cache_key,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }
}

/// Canonical location joined with the query identifier, so that queries
/// on the same location with different ordering or limits do not collide.
pub(crate) fn cache_key_for(query: &Query, database_url: &str) -> String {
    format!("{}?{}", query.reference_url(database_url), query.identifier())
}

/// A one-shot fetch that fails in transit is reported as a failed load.
/// Everything else, such as a denied read, passes through.
fn fetch_error(error: DataError) -> DataError {
    match error {
        DataError::Transport { message } => DataError::load(message),
        other => other,
    }
}

fn unwrap_snapshot(snapshot: Option<DataSnapshot>) -> Value {
    snapshot.map_or(Value::Null, DataSnapshot::into_val)
}

impl DataProvider for DatabaseProvider {
    type Value = Value;

    fn cache_key(&self) -> &str {
        &self.cache_key
    }

    fn load_once(&self) -> BoxFuture<'static, Result<Value, DataError>> {
        let fetch = self.backend.get(&self.query);
        async move { fetch.await.map(unwrap_snapshot).map_err(fetch_error) }.boxed()
    }

    fn subscribe(&self, on_next: OnNext<Value>, on_error: OnError) -> Subscription {
        let listener: OnNext<Option<DataSnapshot>> =
            Arc::new(move |snapshot| on_next(unwrap_snapshot(snapshot)));
        let id = self.backend.on_value(&self.query, listener, on_error);
        trace!(key = %self.cache_key, ?id, "attached value listener");

        let backend = Arc::clone(&self.backend);
        let query = self.query.clone();
        Subscription::new(move || backend.off(&query, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ListenerId;

    #[test]
    fn cache_key_joins_reference_and_identifier() {
        let q = Query::new("rooms/general").limit_to_last(10);
        assert_eq!(
            cache_key_for(&q, "https://chat.test"),
            r#"https://chat.test/rooms/general?{"limitToLast":10}"#
        );
        assert_eq!(
            cache_key_for(&Query::new("rooms"), "https://chat.test"),
            "https://chat.test/rooms?default"
        );
    }

    /// Backend whose reads always fail with `error` and which never
    /// delivers listener events.
    struct FailingReads {
        error: DataError,
    }

    impl DatabaseBackend for FailingReads {
        fn on_value(
            &self,
            _query: &Query,
            _on_next: OnNext<Option<DataSnapshot>>,
            _on_error: OnError,
        ) -> ListenerId {
            ListenerId(0)
        }

        fn off(&self, _query: &Query, _id: ListenerId) {}

        fn get(
            &self,
            _query: &Query,
        ) -> BoxFuture<'static, Result<Option<DataSnapshot>, DataError>> {
            let error = self.error.clone();
            async move { Err(error) }.boxed()
        }
    }

    fn provider_failing_with(error: DataError) -> DatabaseProvider {
        let backend = Arc::new(FailingReads { error });
        DatabaseProvider::new(backend, Query::new("rooms"), "https://chat.test")
    }

    #[tokio::test]
    async fn failed_fetch_reports_load_error() {
        let provider = provider_failing_with(DataError::transport("timed out"));
        assert_eq!(provider.load_once().await, Err(DataError::load("timed out")));
    }

    #[tokio::test]
    async fn denied_fetch_keeps_permission_error() {
        let denied = DataError::PermissionDenied {
            path: "/rooms".into(),
        };
        let provider = provider_failing_with(denied.clone());
        assert_eq!(provider.load_once().await, Err(denied));
    }

    #[test]
    fn absent_snapshot_unwraps_to_null() {
        assert_eq!(unwrap_snapshot(None), Value::Null);
        assert_eq!(
            unwrap_snapshot(Some(DataSnapshot::new(None, Value::from(3)))),
            Value::from(3)
        );
    }
}
