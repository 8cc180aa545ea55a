// ── Consumer bindings ──
//
// One `Binding` per consumer: resolves a cache entry through the registry,
// folds the entry's events through the reducer, and publishes the result on
// a `watch` channel.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;
use tracing::debug;

use crate::cache::{CacheEntry, CacheRegistry, Dispatch, EntrySubscription, ReadResult};
use crate::error::DataError;
use crate::source::DataProvider;
use crate::state::{DataEvent, DataState, Retry, reduce};
use crate::stream::StateStream;

/// A consumer's live view of one provider.
///
/// Stays attached to its cache entry until dropped. The state starts as
/// `Loading` and follows the entry from there.
pub struct Binding<T: Clone + Send + Sync + 'static> {
    inner: Arc<BindingInner<T>>,
}

struct BindingInner<T: Clone + Send + Sync + 'static> {
    registry: CacheRegistry<T>,
    provider: Mutex<Arc<dyn DataProvider<Value = T>>>,
    state: watch::Sender<DataState<T>>,
    attachment: Mutex<Option<EntrySubscription<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Binding<T> {
    pub fn new(registry: CacheRegistry<T>, provider: Arc<dyn DataProvider<Value = T>>) -> Self {
        let (state, _) = watch::channel(DataState::initial());
        let inner = Arc::new(BindingInner {
            registry,
            provider: Mutex::new(provider),
            state,
            attachment: Mutex::new(None),
        });
        inner.attach();
        Self { inner }
    }

    /// The current state.
    pub fn state(&self) -> DataState<T> {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> StateStream<T> {
        StateStream::new(self.inner.state.subscribe())
    }

    pub fn cache_key(&self) -> String {
        lock(&self.inner.provider).cache_key().to_owned()
    }

    /// The cache entry this binding is attached to.
    pub fn entry(&self) -> Arc<CacheEntry<T>> {
        self.inner.entry()
    }

    /// Synchronous read through the attached cache entry.
    pub fn read(&self) -> ReadResult<T> {
        self.inner.entry().read()
    }

    /// Await pending reads until the value or an error is available.
    pub async fn read_settled(&self) -> Result<T, DataError> {
        let entry = self.inner.entry();
        entry.read_settled().await
    }

    /// Point this binding at another provider. Nothing happens when the
    /// cache key is unchanged. Returns whether the binding re-resolved.
    pub fn retarget(&self, provider: Arc<dyn DataProvider<Value = T>>) -> bool {
        {
            let mut current = lock(&self.inner.provider);
            if current.cache_key() == provider.cache_key() {
                return false;
            }
            debug!(
                from = %current.cache_key(),
                to = %provider.cache_key(),
                "binding retargeted"
            );
            *current = provider;
        }
        self.inner.attach();
        true
    }

    /// Inject `error` into the attached entry, as if the upstream failed.
    pub fn simulate_error(&self, error: DataError) {
        self.inner.entry().simulate_error(error);
    }
}

impl<T: Clone + Send + Sync + 'static> BindingInner<T> {
    /// Resolve the entry for the current provider and attach to it, then
    /// drop the previous attachment.
    fn attach(self: &Arc<Self>) {
        let provider = Arc::clone(&*lock(&self.provider));
        let entry = self.registry.entry(provider);
        let subscription = entry.subscribe(dispatcher(Arc::downgrade(self)));
        let previous = lock(&self.attachment).replace(subscription);
        drop(previous);
    }

    fn entry(&self) -> Arc<CacheEntry<T>> {
        if let Some(attached) = lock(&self.attachment).as_ref() {
            return Arc::clone(attached.entry());
        }
        let provider = Arc::clone(&*lock(&self.provider));
        self.registry.entry(provider)
    }

    fn apply(&self, event: DataEvent<T>) {
        self.state.send_modify(|state| {
            let previous = std::mem::take(state);
            *state = reduce(previous, event);
        });
    }
}

/// Entry events feed the reducer. A failure's retry additionally
/// re-resolves the binding, so it lands on a fresh entry.
fn dispatcher<T: Clone + Send + Sync + 'static>(binding: Weak<BindingInner<T>>) -> Dispatch<T> {
    Arc::new(move |event: DataEvent<T>| {
        let Some(inner) = binding.upgrade() else {
            return;
        };
        let event = match event {
            DataEvent::Error { error, retry } => {
                let target = Weak::clone(&binding);
                DataEvent::Error {
                    error,
                    retry: Retry::new(move || {
                        retry.invoke();
                        if let Some(inner) = target.upgrade() {
                            inner.attach();
                        }
                    }),
                }
            }
            other => other,
        };
        inner.apply(event);
    })
}

fn lock<U>(mutex: &Mutex<U>) -> MutexGuard<'_, U> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
