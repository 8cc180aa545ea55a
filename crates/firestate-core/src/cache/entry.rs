// ── Cache entry ──
//
// Owns one provider's upstream subscription and multiplexes it to every
// attached consumer. Also backs synchronous (suspense) reads.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tracing::{debug, trace, warn};

use super::schedule::Deferred;
use crate::error::DataError;
use crate::source::{DataProvider, OnError, OnNext, Subscription};
use crate::state::{DataEvent, Retry};

/// Receiver of the events a cache entry forwards to one consumer.
pub type Dispatch<T> = Arc<dyn Fn(DataEvent<T>) + Send + Sync>;

pub(crate) type EvictFn<T> = Box<dyn Fn(&CacheEntry<T>) + Send + Sync>;

type SharedLoad<T> = Shared<BoxFuture<'static, Result<T, DataError>>>;

// ── ReadResult ───────────────────────────────────────────────────────

/// Outcome of a synchronous read.
pub enum ReadResult<T: Clone> {
    Ready(T),
    /// Not available yet. Await the future, then read again.
    Pending(PendingRead<T>),
    Failed(DataError),
}

impl<T: Clone> ReadResult<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// The value, or `None` when pending or failed.
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(v) => Some(v),
            Self::Pending(_) | Self::Failed(_) => None,
        }
    }
}

impl<T: Clone> fmt::Debug for ReadResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(_) => f.write_str("Ready(..)"),
            Self::Pending(_) => f.write_str("Pending"),
            Self::Failed(e) => write!(f, "Failed({e})"),
        }
    }
}

/// The memoized one-shot load of a pending entry.
///
/// Every reader of the same entry gets a clone of the same future.
#[derive(Clone)]
pub struct PendingRead<T: Clone> {
    inner: SharedLoad<T>,
}

impl<T: Clone> Future for PendingRead<T> {
    type Output = Result<T, DataError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

// ── Internal state ───────────────────────────────────────────────────

enum Status<T> {
    Pending,
    Loaded(T),
    Failed { error: DataError, last: Option<T> },
}

enum Upstream {
    Closed,
    Opening,
    Open(Subscription),
}

struct EntryState<T: Clone> {
    status: Status<T>,
    /// Registration order is delivery order.
    subscribers: Vec<(u64, Dispatch<T>)>,
    next_id: u64,
    upstream: Upstream,
    load: Option<SharedLoad<T>>,
    release: Option<Deferred>,
    /// Bumped whenever a scheduled release becomes stale.
    release_generation: u64,
    /// Bumped on every status change, so a replay can tell whether an
    /// upstream event overtook it.
    events_seen: u64,
}

impl<T: Clone> EntryState<T> {
    fn pending(&self) -> bool {
        matches!(self.status, Status::Pending)
    }

    fn idle(&self) -> bool {
        self.subscribers.is_empty() && !self.pending()
    }

    fn dispatchers(&self) -> Vec<Dispatch<T>> {
        self.subscribers.iter().map(|(_, d)| Arc::clone(d)).collect()
    }

    fn take_last(&mut self) -> Option<T> {
        match std::mem::replace(&mut self.status, Status::Pending) {
            Status::Pending => None,
            Status::Loaded(v) | Status::Failed { last: Some(v), .. } => Some(v),
            Status::Failed { last: None, .. } => None,
        }
    }

    /// No subscribers and no release armed yet. Upstream events never push
    /// an armed release back. Entries only ever read (upstream closed)
    /// qualify too, once their load settles.
    fn wants_release(&self) -> bool {
        self.subscribers.is_empty() && self.release.is_none()
    }

    fn invalidate_release(&mut self) -> u64 {
        if let Some(release) = self.release.take() {
            release.cancel();
        }
        self.release_generation += 1;
        self.release_generation
    }
}

// ── CacheEntry ───────────────────────────────────────────────────────

/// One shared upstream subscription, fanned out to N consumers.
///
/// Created and handed out by [`CacheRegistry`](super::CacheRegistry).
/// No lock is held while a provider, dispatch, or eviction callback runs.
pub struct CacheEntry<T: Clone + Send + Sync + 'static> {
    key: String,
    provider: Arc<dyn DataProvider<Value = T>>,
    state: Mutex<EntryState<T>>,
    on_evict: EvictFn<T>,
    evicted: AtomicBool,
    release_delay: Duration,
    me: Weak<Self>,
}

impl<T: Clone + Send + Sync + 'static> CacheEntry<T> {
    pub(crate) fn new(
        provider: Arc<dyn DataProvider<Value = T>>,
        release_delay: Duration,
        on_evict: EvictFn<T>,
    ) -> Arc<Self> {
        let key = provider.cache_key().to_owned();
        Arc::new_cyclic(|me| Self {
            key,
            provider,
            state: Mutex::new(EntryState {
                status: Status::Pending,
                subscribers: Vec::new(),
                next_id: 0,
                upstream: Upstream::Closed,
                load: None,
                release: None,
                release_generation: 0,
                events_seen: 0,
            }),
            on_evict,
            evicted: AtomicBool::new(false),
            release_delay,
            me: me.clone(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_pending(&self) -> bool {
        self.lock().pending()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Whether this entry has been removed from its registry.
    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::SeqCst)
    }

    /// Last successful value, kept across later failures.
    pub fn latest(&self) -> Option<T> {
        match &self.lock().status {
            Status::Pending => None,
            Status::Loaded(v) => Some(v.clone()),
            Status::Failed { last, .. } => last.clone(),
        }
    }

    pub fn error(&self) -> Option<DataError> {
        match &self.lock().status {
            Status::Failed { error, .. } => Some(error.clone()),
            Status::Pending | Status::Loaded(_) => None,
        }
    }

    // ── Subscribing ──────────────────────────────────────────────────

    /// Attach a consumer.
    ///
    /// The upstream subscription is opened on the first call only. A
    /// consumer that joins while the entry is pending receives
    /// `BeginLoading`; one that joins a settled entry receives the current
    /// value or error.
    pub fn subscribe(self: &Arc<Self>, dispatch: Dispatch<T>) -> EntrySubscription<T> {
        let (id, open_upstream, events_seen) = {
            let mut st = self.lock();
            if st.release.is_some() {
                trace!(key = %self.key, "subscriber arrived, cancelling release");
            }
            st.invalidate_release();

            let id = st.next_id;
            st.next_id += 1;
            st.subscribers.push((id, Arc::clone(&dispatch)));

            let open_upstream = matches!(st.upstream, Upstream::Closed);
            if open_upstream {
                st.upstream = Upstream::Opening;
            }
            (id, open_upstream, st.events_seen)
        };

        if open_upstream {
            self.open_upstream();
        }

        // An upstream that delivered while we were opening it has already
        // reached this subscriber.
        let mut seen = events_seen;
        let mut replay = {
            let st = self.lock();
            (st.events_seen == seen).then(|| self.current_event(&st, &dispatch))
        };
        // An event dispatched on another thread may land before the replay
        // does. Replay again until no status change raced with it.
        while let Some(event) = replay.take() {
            dispatch(event);
            let st = self.lock();
            if st.events_seen != seen {
                seen = st.events_seen;
                replay = Some(self.current_event(&st, &dispatch));
            }
        }

        EntrySubscription {
            entry: Arc::clone(self),
            id,
            active: AtomicBool::new(true),
        }
    }

    fn current_event(&self, st: &EntryState<T>, dispatch: &Dispatch<T>) -> DataEvent<T> {
        match &st.status {
            Status::Pending => DataEvent::BeginLoading,
            Status::Loaded(v) => DataEvent::Value(v.clone()),
            Status::Failed { error, .. } => DataEvent::Error {
                error: error.clone(),
                retry: self.retry_for(dispatch),
            },
        }
    }

    fn open_upstream(&self) {
        debug!(key = %self.key, "opening upstream subscription");
        let next_entry = self.me.clone();
        let on_next: OnNext<T> = Arc::new(move |value| {
            if let Some(entry) = next_entry.upgrade() {
                entry.receive_value(value);
            }
        });
        let error_entry = self.me.clone();
        let on_error: OnError = Arc::new(move |error| {
            if let Some(entry) = error_entry.upgrade() {
                entry.receive_error(error);
            }
        });

        let subscription = self.provider.subscribe(on_next, on_error);

        let mut st = self.lock();
        if matches!(st.upstream, Upstream::Opening) {
            st.upstream = Upstream::Open(subscription);
        } else {
            drop(st);
            subscription.unsubscribe();
        }
    }

    fn unsubscribe(&self, id: u64) {
        let idle = {
            let mut st = self.lock();
            st.subscribers.retain(|(sid, _)| *sid != id);
            st.idle()
        };
        trace!(key = %self.key, id, "subscriber detached");
        if idle {
            self.schedule_release();
        }
    }

    // ── Upstream events ──────────────────────────────────────────────

    fn receive_value(&self, value: T) {
        let (dispatchers, release) = {
            let mut st = self.lock();
            st.events_seen += 1;
            st.status = Status::Loaded(value.clone());
            (st.dispatchers(), st.wants_release())
        };
        trace!(key = %self.key, subscribers = dispatchers.len(), "dispatching value");
        for dispatch in dispatchers {
            dispatch(DataEvent::Value(value.clone()));
        }
        if release {
            self.schedule_release();
        }
    }

    fn receive_error(&self, error: DataError) {
        warn!(key = %self.key, error = %error, "upstream reported an error");
        let (dispatchers, release) = {
            let mut st = self.lock();
            st.events_seen += 1;
            let last = st.take_last();
            st.status = Status::Failed {
                error: error.clone(),
                last,
            };
            (st.dispatchers(), st.wants_release())
        };
        self.dispatch_error(&dispatchers, &error);
        if release {
            self.schedule_release();
        }
    }

    fn dispatch_error(&self, dispatchers: &[Dispatch<T>], error: &DataError) {
        for dispatch in dispatchers {
            dispatch(DataEvent::Error {
                error: error.clone(),
                retry: self.retry_for(dispatch),
            });
        }
    }

    /// Retry handed to one consumer: evict this entry, then put that
    /// consumer back into a loading state.
    fn retry_for(&self, dispatch: &Dispatch<T>) -> Retry {
        let entry = self.me.clone();
        let dispatch = Arc::clone(dispatch);
        Retry::new(move || {
            if let Some(entry) = entry.upgrade() {
                entry.evict();
            }
            dispatch(DataEvent::BeginLoading);
        })
    }

    // ── Suspense reads ───────────────────────────────────────────────

    /// Synchronous read.
    ///
    /// A pending entry starts (once) a one-shot load and returns it as
    /// [`ReadResult::Pending`]. A failed entry schedules its own eviction so
    /// the next request starts fresh.
    pub fn read(&self) -> ReadResult<T> {
        let settled = {
            let st = self.lock();
            match &st.status {
                Status::Loaded(v) => Some(ReadResult::Ready(v.clone())),
                Status::Failed { error, .. } => Some(ReadResult::Failed(error.clone())),
                Status::Pending => st.load.as_ref().map(|load| {
                    ReadResult::Pending(PendingRead {
                        inner: load.clone(),
                    })
                }),
            }
        };
        match settled {
            Some(ReadResult::Failed(error)) => {
                self.schedule_eviction();
                return ReadResult::Failed(error);
            }
            Some(result) => return result,
            None => {}
        }

        let load = self.start_load();
        let mut st = self.lock();
        let inner = st.load.get_or_insert(load).clone();
        ReadResult::Pending(PendingRead { inner })
    }

    /// Await pending reads until the entry settles.
    pub async fn read_settled(&self) -> Result<T, DataError> {
        loop {
            match self.read() {
                ReadResult::Ready(v) => return Ok(v),
                ReadResult::Failed(e) => return Err(e),
                ReadResult::Pending(pending) => {
                    // The next read reports the outcome, including the case
                    // where the continuous subscription superseded the load.
                    let _ = pending.await;
                }
            }
        }
    }

    fn start_load(&self) -> SharedLoad<T> {
        debug!(key = %self.key, "starting one-shot load");
        let entry = self.me.clone();
        let fetch = self.provider.load_once();
        async move {
            let result = fetch.await;
            if let Some(entry) = entry.upgrade() {
                entry.settle_from_load(&result);
            }
            result
        }
        .boxed()
        .shared()
    }

    /// A one-shot load only settles an entry the subscription has not
    /// settled yet.
    fn settle_from_load(&self, result: &Result<T, DataError>) {
        if !self.is_pending() {
            trace!(key = %self.key, "one-shot load superseded by subscription");
            return;
        }
        debug!(key = %self.key, ok = result.is_ok(), "one-shot load settled entry");
        match result {
            Ok(value) => self.receive_value(value.clone()),
            Err(error) => self.receive_error(error.clone()),
        }
    }

    // ── Test support ─────────────────────────────────────────────────

    /// Record `error` as if the upstream had reported it and replay it to
    /// every attached consumer.
    pub fn simulate_error(&self, error: DataError) {
        debug!(key = %self.key, error = %error, "injecting simulated error");
        let (dispatchers, release) = {
            let mut st = self.lock();
            st.events_seen += 1;
            let last = st.take_last();
            st.status = Status::Failed {
                error: error.clone(),
                last,
            };
            (st.dispatchers(), st.wants_release())
        };
        self.dispatch_error(&dispatchers, &error);
        if release {
            self.schedule_release();
        }
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Remove this entry from its registry. Only the first call has an
    /// effect.
    pub fn evict(&self) {
        if self.evicted.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(key = %self.key, "evicting cache entry");
        (self.on_evict)(self);
    }

    fn schedule_eviction(&self) {
        let entry = self.me.clone();
        let _ = Deferred::schedule(Duration::ZERO, move || {
            if let Some(entry) = entry.upgrade() {
                entry.evict();
            }
        });
    }

    /// Detach upstream and evict after `release_delay`, unless a consumer
    /// attaches first.
    fn schedule_release(&self) {
        let generation = self.lock().invalidate_release();
        let entry = self.me.clone();
        let deferred = Deferred::schedule(self.release_delay, move || {
            if let Some(entry) = entry.upgrade() {
                entry.release(generation);
            }
        });

        if let Some(deferred) = deferred {
            let mut st = self.lock();
            if st.release_generation == generation {
                st.release = Some(deferred);
            } else {
                deferred.cancel();
            }
        }
    }

    fn release(&self, generation: u64) {
        let upstream = {
            let mut st = self.lock();
            if st.release_generation != generation || !st.idle() {
                return;
            }
            st.release = None;
            std::mem::replace(&mut st.upstream, Upstream::Closed)
        };
        if let Upstream::Open(subscription) = upstream {
            debug!(key = %self.key, "detaching upstream subscription");
            subscription.unsubscribe();
        }
        self.evict();
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, EntryState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Send + Sync + 'static> fmt::Debug for CacheEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("evicted", &self.is_evicted())
            .finish_non_exhaustive()
    }
}

// ── EntrySubscription ────────────────────────────────────────────────

/// A consumer's attachment to a [`CacheEntry`]. Detaches on drop.
pub struct EntrySubscription<T: Clone + Send + Sync + 'static> {
    entry: Arc<CacheEntry<T>>,
    id: u64,
    active: AtomicBool,
}

impl<T: Clone + Send + Sync + 'static> EntrySubscription<T> {
    pub fn entry(&self) -> &Arc<CacheEntry<T>> {
        &self.entry
    }

    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.entry.unsubscribe(self.id);
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for EntrySubscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
