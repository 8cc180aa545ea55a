// ── In-memory realtime database ──
//
// A JSON tree with value listeners. Writes notify every listener whose
// location overlaps the written path and whose query result changed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::DataError;
use crate::model::{DataSnapshot, Query};
use crate::source::{DatabaseBackend, ListenerId, OnError, OnNext};

struct Listener {
    query: Query,
    on_next: OnNext<Option<DataSnapshot>>,
    on_error: OnError,
    /// Last value delivered, `None` until the first delivery.
    delivered: Option<Value>,
}

#[derive(Default)]
struct DbInner {
    root: Value,
    listeners: BTreeMap<u64, Listener>,
    next_id: u64,
    denied: BTreeSet<String>,
    immediate: bool,
}

type Delivery = (OnNext<Option<DataSnapshot>>, DataSnapshot);
type Failure = (OnError, DataError);

impl DbInner {
    fn value_at(&self, path: &str) -> Value {
        segments(path)
            .try_fold(&self.root, |node, segment| node.get(segment))
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn is_denied(&self, path: &str) -> bool {
        self.denied.iter().any(|rule| is_under(path, rule))
    }

    fn snapshot_for(&self, query: &Query) -> DataSnapshot {
        DataSnapshot::new(
            query.key().map(str::to_owned),
            query.apply(&self.value_at(query.path())),
        )
    }

    /// Listeners affected by a write at `path`, with their new snapshot.
    fn collect_changes(&mut self, path: &str, include_unprimed: bool) -> Vec<Delivery> {
        let ids: Vec<u64> = self
            .listeners
            .iter()
            .filter(|(_, l)| overlaps(l.query.path(), path))
            .filter(|(_, l)| include_unprimed || l.delivered.is_some())
            .map(|(id, _)| *id)
            .collect();

        let mut out = Vec::new();
        for id in ids {
            let Some(query) = self.listeners.get(&id).map(|l| l.query.clone()) else {
                continue;
            };
            let snapshot = self.snapshot_for(&query);
            let Some(listener) = self.listeners.get_mut(&id) else {
                continue;
            };
            if listener.delivered.as_ref() == Some(&snapshot.value) {
                continue;
            }
            listener.delivered = Some(snapshot.value.clone());
            out.push((Arc::clone(&listener.on_next), snapshot));
        }
        out
    }

    /// Remove every listener at or below `path`, returning their error
    /// callbacks paired with `error`.
    fn cancel_under(&mut self, path: &str, error: &DataError) -> Vec<Failure> {
        let ids: Vec<u64> = self
            .listeners
            .iter()
            .filter(|(_, l)| is_under(l.query.path(), path))
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.listeners.remove(&id))
            .map(|l| (l.on_error, error.clone()))
            .collect()
    }
}

/// In-memory realtime database.
///
/// By default new listeners receive nothing until [`flush`](Self::flush)
/// or a write reaches them, which models the network round trip. Use
/// [`with_immediate_delivery`](Self::with_immediate_delivery) to deliver
/// the current value during `on_value`.
#[derive(Default)]
pub struct MemoryDatabase {
    inner: Arc<Mutex<DbInner>>,
    on_value_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(root: Value) -> Self {
        let db = Self::new();
        db.lock().root = root;
        db
    }

    pub fn with_immediate_delivery(self) -> Self {
        self.lock().immediate = true;
        self
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Write `value` at `path`. Writing `null` removes the location.
    pub fn set(&self, path: &str, value: Value) {
        let path = Query::new(path).path().to_owned();
        let deliveries = {
            let mut inner = self.lock();
            write_at(&mut inner.root, &path, value);
            inner.collect_changes(&path, true)
        };
        debug!(path = %path, notified = deliveries.len(), "database write");
        deliver(deliveries);
    }

    /// Write several children of `path` as one change.
    pub fn update(&self, path: &str, children: Map<String, Value>) {
        let path = Query::new(path).path().to_owned();
        let deliveries = {
            let mut inner = self.lock();
            for (key, value) in children {
                let child = Query::new(&format!("{path}/{key}")).path().to_owned();
                write_at(&mut inner.root, &child, value);
            }
            inner.collect_changes(&path, true)
        };
        deliver(deliveries);
    }

    pub fn remove(&self, path: &str) {
        self.set(path, Value::Null);
    }

    /// Deliver current values to listeners that have not received one yet.
    pub fn flush(&self) {
        let deliveries = {
            let mut inner = self.lock();
            let unprimed: Vec<Query> = inner
                .listeners
                .values()
                .filter(|l| l.delivered.is_none())
                .map(|l| l.query.clone())
                .collect();
            let mut out = Vec::new();
            for query in unprimed {
                out.extend(inner.collect_changes(query.path(), true));
            }
            out
        };
        trace!(notified = deliveries.len(), "flushed initial values");
        deliver(deliveries);
    }

    // ── Faults ───────────────────────────────────────────────────────

    /// Deny access at and below `path`. Live listeners there are cancelled
    /// with `PermissionDenied`; later attaches and fetches fail the same way.
    pub fn deny(&self, path: &str) {
        let path = Query::new(path).path().to_owned();
        let failures = {
            let mut inner = self.lock();
            inner.denied.insert(path.clone());
            let error = DataError::PermissionDenied {
                path: format!("/{path}"),
            };
            inner.cancel_under(&path, &error)
        };
        fail_all(failures);
    }

    pub fn allow(&self, path: &str) {
        let path = Query::new(path).path().to_owned();
        self.lock().denied.remove(&path);
    }

    /// Cancel every listener at or below `path` with `error`.
    pub fn fail(&self, path: &str, error: &DataError) {
        let path = Query::new(path).path().to_owned();
        let failures = self.lock().cancel_under(&path, error);
        fail_all(failures);
    }

    // ── Inspection ───────────────────────────────────────────────────

    pub fn value(&self, path: &str) -> Value {
        let path = Query::new(path).path().to_owned();
        self.lock().value_at(&path)
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Total `on_value` calls so far.
    pub fn on_value_calls(&self) -> usize {
        self.on_value_calls.load(Ordering::SeqCst)
    }

    /// Total `get` calls so far.
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, DbInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DatabaseBackend for MemoryDatabase {
    fn on_value(
        &self,
        query: &Query,
        on_next: OnNext<Option<DataSnapshot>>,
        on_error: OnError,
    ) -> ListenerId {
        self.on_value_calls.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;

        if inner.is_denied(query.path()) {
            drop(inner);
            debug!(path = %query, "listener rejected by rules");
            on_error(DataError::PermissionDenied {
                path: query.to_string(),
            });
            return ListenerId(id);
        }

        inner.listeners.insert(
            id,
            Listener {
                query: query.clone(),
                on_next,
                on_error,
                delivered: None,
            },
        );
        let deliveries = if inner.immediate {
            inner.collect_changes(query.path(), true)
        } else {
            Vec::new()
        };
        drop(inner);
        deliver(deliveries);
        ListenerId(id)
    }

    fn off(&self, query: &Query, id: ListenerId) {
        let removed = self.lock().listeners.remove(&id.0);
        trace!(path = %query, id = id.0, removed = removed.is_some(), "listener detached");
    }

    fn get(&self, query: &Query) -> BoxFuture<'static, Result<Option<DataSnapshot>, DataError>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let inner = self.lock();
        let result = if inner.is_denied(query.path()) {
            Err(DataError::PermissionDenied {
                path: query.to_string(),
            })
        } else {
            Ok(Some(inner.snapshot_for(query)))
        };
        future::ready(result).boxed()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn deliver(deliveries: Vec<Delivery>) {
    for (on_next, snapshot) in deliveries {
        on_next(Some(snapshot));
    }
}

fn fail_all(failures: Vec<Failure>) {
    for (on_error, error) in failures {
        on_error(error);
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// `path` equals `prefix` or lies below it.
fn is_under(path: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn overlaps(a: &str, b: &str) -> bool {
    is_under(a, b) || is_under(b, a)
}

fn write_at(root: &mut Value, path: &str, value: Value) {
    let parts: Vec<&str> = segments(path).collect();
    let Some((last, parents)) = parts.split_last() else {
        *root = value;
        return;
    };

    let mut node = root;
    for part in parents {
        if !node.is_object() {
            if value.is_null() {
                return;
            }
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map
                .entry((*part).to_owned())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return,
        };
    }

    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        if value.is_null() {
            map.remove(*last);
        } else {
            map.insert((*last).to_owned(), value);
        }
    }
}
