// Cache entry and registry behavior against a hand-driven provider.
#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use pretty_assertions::assert_eq;
use tokio::sync::oneshot;

use firestate_core::source::{OnError, OnNext};
use firestate_core::{
    CacheConfig, CacheRegistry, DataError, DataEvent, DataProvider, DataState, Dispatch,
    ReadResult, Subscription, reduce,
};

// ── Helpers ─────────────────────────────────────────────────────────

type Handlers = Arc<Mutex<Vec<(u64, OnNext<u32>, OnError)>>>;
type LoadResult = Result<u32, DataError>;

/// Provider whose upstream events and one-shot load are driven by the test.
struct ManualProvider {
    key: String,
    subscribes: AtomicUsize,
    detaches: Arc<AtomicUsize>,
    loads: AtomicUsize,
    handlers: Handlers,
    load_tx: Mutex<Option<oneshot::Sender<LoadResult>>>,
    load_rx: Mutex<Option<oneshot::Receiver<LoadResult>>>,
}

impl ManualProvider {
    fn new(key: &str) -> Arc<Self> {
        let (tx, rx) = oneshot::channel();
        Arc::new(Self {
            key: key.into(),
            subscribes: AtomicUsize::new(0),
            detaches: Arc::new(AtomicUsize::new(0)),
            loads: AtomicUsize::new(0),
            handlers: Arc::new(Mutex::new(Vec::new())),
            load_tx: Mutex::new(Some(tx)),
            load_rx: Mutex::new(Some(rx)),
        })
    }

    fn emit(&self, value: u32) {
        let handlers: Vec<OnNext<u32>> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, n, _)| Arc::clone(n))
            .collect();
        for on_next in handlers {
            on_next(value);
        }
    }

    fn fail(&self, error: &DataError) {
        let handlers: Vec<OnError> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, e)| Arc::clone(e))
            .collect();
        for on_error in handlers {
            on_error(error.clone());
        }
    }

    fn finish_load(&self, result: LoadResult) {
        if let Some(tx) = self.load_tx.lock().unwrap().take() {
            let _ = tx.send(result);
        }
    }

    fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    fn detaches(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }
}

impl DataProvider for ManualProvider {
    type Value = u32;

    fn cache_key(&self) -> &str {
        &self.key
    }

    fn load_once(&self) -> BoxFuture<'static, LoadResult> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let rx = self.load_rx.lock().unwrap().take();
        async move {
            match rx {
                Some(rx) => rx.await.unwrap_or(Err(DataError::Disconnected)),
                None => Err(DataError::Disconnected),
            }
        }
        .boxed()
    }

    fn subscribe(&self, on_next: OnNext<u32>, on_error: OnError) -> Subscription {
        let id = u64::try_from(self.subscribes.fetch_add(1, Ordering::SeqCst)).unwrap();
        self.handlers.lock().unwrap().push((id, on_next, on_error));
        let handlers = Arc::clone(&self.handlers);
        let detaches = Arc::clone(&self.detaches);
        Subscription::new(move || {
            handlers.lock().unwrap().retain(|(h, _, _)| *h != id);
            detaches.fetch_add(1, Ordering::SeqCst);
        })
    }
}

/// Records every event a consumer receives and folds them into a state.
#[derive(Clone)]
struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
    state: Arc<Mutex<DataState<u32>>>,
}

impl Recorder {
    fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            state: Arc::new(Mutex::new(DataState::initial())),
        }
    }

    fn dispatch(&self) -> Dispatch<u32> {
        let rec = self.clone();
        Arc::new(move |event: DataEvent<u32>| {
            let label = match &event {
                DataEvent::BeginLoading => "loading".to_owned(),
                DataEvent::Value(v) => format!("value:{v}"),
                DataEvent::Error { error, .. } => format!("error:{error}"),
            };
            rec.events.lock().unwrap().push(label);
            let mut state = rec.state.lock().unwrap();
            let previous = std::mem::take(&mut *state);
            *state = reduce(previous, event);
        })
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn state(&self) -> DataState<u32> {
        self.state.lock().unwrap().clone()
    }
}

fn registry() -> CacheRegistry<u32> {
    CacheRegistry::new(CacheConfig::default())
}

fn registry_with_delay(millis: u64) -> CacheRegistry<u32> {
    CacheRegistry::new(CacheConfig::default().with_release_delay(Duration::from_millis(millis)))
}

/// Let deferred releases and evictions run.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

// ── Sharing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn equal_keys_share_entry_and_upstream() {
    let cache = registry();
    let first = ManualProvider::new("rooms");
    let second = ManualProvider::new("rooms");

    let a = cache.entry(first.clone());
    let b = cache.entry(second.clone());
    assert!(Arc::ptr_eq(&a, &b));

    let (ra, rb) = (Recorder::new(), Recorder::new());
    let _sa = a.subscribe(ra.dispatch());
    let _sb = b.subscribe(rb.dispatch());

    assert_eq!(first.subscribes() + second.subscribes(), 1);
    assert_eq!(a.subscriber_count(), 2);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn subscribers_joining_while_pending_share_first_value() {
    let cache = registry();
    let provider = ManualProvider::new("k");
    let entry = cache.entry(provider.clone());

    let (ra, rb) = (Recorder::new(), Recorder::new());
    let _sa = entry.subscribe(ra.dispatch());
    let _sb = entry.subscribe(rb.dispatch());
    provider.emit(7);

    assert_eq!(ra.events(), vec!["loading", "value:7"]);
    assert_eq!(rb.events(), vec!["loading", "value:7"]);
    assert_eq!(provider.subscribes(), 1);
}

#[tokio::test]
async fn consumers_see_identical_event_order() {
    let cache = registry();
    let provider = ManualProvider::new("k");
    let entry = cache.entry(provider.clone());

    let (ra, rb) = (Recorder::new(), Recorder::new());
    let _sa = entry.subscribe(ra.dispatch());
    let _sb = entry.subscribe(rb.dispatch());
    for v in [1, 2, 3] {
        provider.emit(v);
    }
    provider.fail(&DataError::transport("offline"));

    let expected = vec![
        "loading",
        "value:1",
        "value:2",
        "value:3",
        "error:Transport error: offline",
    ];
    assert_eq!(ra.events(), expected);
    assert_eq!(rb.events(), expected);
}

#[tokio::test]
async fn late_subscriber_receives_current_value() {
    let cache = registry();
    let provider = ManualProvider::new("k");
    let entry = cache.entry(provider.clone());

    let first = Recorder::new();
    let _s1 = entry.subscribe(first.dispatch());
    provider.emit(4);

    let late = Recorder::new();
    let _s2 = entry.subscribe(late.dispatch());
    assert_eq!(late.events(), vec!["value:4"]);
    assert!(matches!(late.state(), DataState::Ready { data: 4 }));
    assert_eq!(provider.subscribes(), 1);
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn last_detach_from_settled_entry_releases_it() {
    let cache = registry();
    let provider = ManualProvider::new("k");
    let entry = cache.entry(provider.clone());

    let sub = entry.subscribe(Recorder::new().dispatch());
    provider.emit(1);
    drop(sub);

    // Release waits for the next tick.
    assert!(cache.contains("k"));
    settle().await;

    assert!(!cache.contains("k"));
    assert!(entry.is_evicted());
    assert_eq!(provider.detaches(), 1);

    let fresh = cache.entry(provider.clone());
    assert!(!Arc::ptr_eq(&entry, &fresh));
    let _sub = fresh.subscribe(Recorder::new().dispatch());
    assert_eq!(provider.subscribes(), 2);
}

#[tokio::test]
async fn quick_remount_keeps_upstream_open() {
    let cache = registry();
    let provider = ManualProvider::new("k");
    let entry = cache.entry(provider.clone());

    let sub = entry.subscribe(Recorder::new().dispatch());
    provider.emit(1);
    drop(sub);

    let again = cache.entry(provider.clone());
    assert!(Arc::ptr_eq(&entry, &again));
    let remounted = Recorder::new();
    let _sub = again.subscribe(remounted.dispatch());
    settle().await;

    assert!(cache.contains("k"));
    assert_eq!(provider.subscribes(), 1);
    assert_eq!(provider.detaches(), 0);
    assert_eq!(remounted.events(), vec!["value:1"]);
}

#[tokio::test]
async fn pending_entry_outlives_its_subscribers_until_settled() {
    let cache = registry();
    let provider = ManualProvider::new("k");
    let entry = cache.entry(provider.clone());

    drop(entry.subscribe(Recorder::new().dispatch()));
    settle().await;
    assert!(cache.contains("k"));
    assert_eq!(provider.detaches(), 0);

    provider.emit(2);
    settle().await;
    assert!(!cache.contains("k"));
    assert_eq!(provider.detaches(), 1);
    assert_eq!(entry.latest(), Some(2));
}

#[tokio::test(start_paused = true)]
async fn steady_upstream_does_not_postpone_release() {
    let cache = registry_with_delay(100);
    let provider = ManualProvider::new("k");
    let entry = cache.entry(provider.clone());

    drop(entry.subscribe(Recorder::new().dispatch()));
    provider.emit(0);

    // Values keep arriving twice per release delay.
    for v in 1..=20 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        provider.emit(v);
    }
    settle().await;

    assert_eq!(provider.detaches(), 1);
    assert!(entry.is_evicted());
    assert!(!cache.contains("k"));
}

#[tokio::test]
async fn read_only_entry_is_released_once_loaded() {
    let cache = registry();
    let provider = ManualProvider::new("k");
    let entry = cache.entry(provider.clone());

    let ReadResult::Pending(pending) = entry.read() else {
        panic!("expected a pending read");
    };
    provider.finish_load(Ok(8));
    assert_eq!(pending.await, Ok(8));
    assert_eq!(entry.read().ready(), Some(8));

    settle().await;
    assert!(entry.is_evicted());
    assert!(!cache.contains("k"));
    assert_eq!(provider.subscribes(), 0);
}

#[tokio::test]
async fn stale_eviction_does_not_remove_newer_entry() {
    let cache = registry();
    let provider = ManualProvider::new("k");
    let old = cache.entry(provider.clone());
    old.evict();
    let newer = cache.entry(provider.clone());

    old.evict();
    assert!(cache.contains("k"));
    assert!(Arc::ptr_eq(&cache.get("k").unwrap(), &newer));
}

#[tokio::test]
async fn clear_empties_registry() {
    let cache = registry();
    let _a = cache.entry(ManualProvider::new("a"));
    let _b = cache.entry(ManualProvider::new("b"));
    assert_eq!(cache.len(), 2);
    cache.clear();
    assert!(cache.is_empty());
}

// ── Errors and retry ────────────────────────────────────────────────

#[tokio::test]
async fn upstream_error_carries_retry_that_evicts() {
    let cache = registry();
    let provider = ManualProvider::new("k");
    let entry = cache.entry(provider.clone());
    let rec = Recorder::new();
    let _sub = entry.subscribe(rec.dispatch());

    let err = DataError::transport("socket closed");
    provider.fail(&err);

    let state = rec.state();
    assert!(!state.loading());
    assert_eq!(state.error(), Some(&err));
    let retry = state.retry().cloned().unwrap();

    retry.invoke();
    assert!(!cache.contains("k"));
    let state = rec.state();
    assert!(state.loading());
    assert!(state.failed());
    assert_eq!(state.error(), Some(&err));
}

#[tokio::test]
async fn simulated_error_reaches_active_subscriber() {
    let cache = registry();
    let provider = ManualProvider::new("k");
    let entry = cache.entry(provider.clone());
    let rec = Recorder::new();
    let _sub = entry.subscribe(rec.dispatch());
    provider.emit(3);

    let err = DataError::simulated("injected");
    entry.simulate_error(err.clone());

    let state = rec.state();
    assert!(state.failed());
    assert!(!state.loading());
    assert_eq!(state.error(), Some(&err));
    assert_eq!(state.data(), Some(&3));
    assert_eq!(entry.error(), Some(err));
}

#[tokio::test]
async fn simulated_error_on_idle_entry_releases_it() {
    let cache = registry();
    let provider = ManualProvider::new("k");
    let entry = cache.entry(provider.clone());

    // Detached while pending, so nothing has released it yet.
    drop(entry.subscribe(Recorder::new().dispatch()));
    settle().await;
    assert!(cache.contains("k"));

    entry.simulate_error(DataError::simulated("injected"));
    settle().await;
    assert!(!cache.contains("k"));
    assert_eq!(provider.detaches(), 1);
}

// ── Concurrent delivery ─────────────────────────────────────────────

#[test]
fn late_subscribers_end_on_latest_value_under_concurrent_updates() {
    let cache = registry();
    let provider = ManualProvider::new("k");
    let entry = cache.entry(provider.clone());
    let _first = entry.subscribe(Recorder::new().dispatch());
    provider.emit(0);

    let joined = thread::scope(|scope| {
        scope.spawn(|| {
            for v in 1..=500 {
                provider.emit(v);
            }
        });
        let joiner = scope.spawn(|| {
            (0..100)
                .map(|_| {
                    let rec = Recorder::new();
                    let sub = entry.subscribe(rec.dispatch());
                    (rec, sub)
                })
                .collect::<Vec<_>>()
        });
        joiner.join().unwrap()
    });

    assert_eq!(entry.latest(), Some(500));
    for (rec, _sub) in &joined {
        assert!(matches!(rec.state(), DataState::Ready { data: 500 }));
    }
}

// ── Suspense reads ──────────────────────────────────────────────────

#[tokio::test]
async fn read_on_pending_entry_suspends_until_loaded() {
    let cache = registry();
    let provider = ManualProvider::new("k");
    let entry = cache.entry(provider.clone());

    let ReadResult::Pending(pending) = entry.read() else {
        panic!("expected a pending read");
    };
    assert!(entry.read().is_pending());
    assert_eq!(provider.loads.load(Ordering::SeqCst), 1);

    provider.finish_load(Ok(5));
    assert_eq!(pending.await, Ok(5));
    assert_eq!(entry.read().ready(), Some(5));
}

#[tokio::test]
async fn subscription_value_supersedes_one_shot_load() {
    let cache = registry();
    let provider = ManualProvider::new("k");
    let entry = cache.entry(provider.clone());
    let rec = Recorder::new();
    let _sub = entry.subscribe(rec.dispatch());

    let ReadResult::Pending(pending) = entry.read() else {
        panic!("expected a pending read");
    };
    provider.emit(9);
    assert_eq!(entry.read().ready(), Some(9));

    provider.finish_load(Ok(1));
    assert_eq!(pending.await, Ok(1));
    assert_eq!(entry.read().ready(), Some(9));
    assert_eq!(rec.events(), vec!["loading", "value:9"]);
}

#[tokio::test]
async fn one_shot_load_settles_subscribers_when_first() {
    let cache = registry();
    let provider = ManualProvider::new("k");
    let entry = cache.entry(provider.clone());
    let rec = Recorder::new();
    let _sub = entry.subscribe(rec.dispatch());

    let read = tokio::spawn({
        let entry = Arc::clone(&entry);
        async move { entry.read_settled().await }
    });
    settle().await;
    provider.finish_load(Ok(6));

    assert_eq!(read.await.unwrap(), Ok(6));
    assert_eq!(rec.events(), vec!["loading", "value:6"]);
}

#[tokio::test]
async fn read_of_failed_entry_schedules_eviction() {
    let cache = registry();
    let provider = ManualProvider::new("k");
    let entry = cache.entry(provider.clone());
    let _sub = entry.subscribe(Recorder::new().dispatch());

    let err = DataError::transport("denied");
    provider.fail(&err);

    assert!(matches!(entry.read(), ReadResult::Failed(e) if e == err));
    assert!(!entry.is_evicted());
    settle().await;
    assert!(entry.is_evicted());
    assert!(!cache.contains("k"));
}
