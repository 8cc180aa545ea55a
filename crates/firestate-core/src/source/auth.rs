// ── Auth stream adapter ──

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::oneshot;
use tracing::debug;

use super::{AuthBackend, DataProvider, OnError, OnNext, Subscription};
use crate::error::DataError;
use crate::model::User;

/// There is one auth stream per process, so its key is fixed.
pub const AUTH_CACHE_KEY: &str = "auth";

/// Adapts an [`AuthBackend`] into a [`DataProvider`] of the current user.
pub struct AuthProvider {
    backend: Arc<dyn AuthBackend>,
}

impl AuthProvider {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        Self { backend }
    }
}

/// Shared between a one-shot listener and the code registering it.
struct OneShot {
    sender: Option<oneshot::Sender<Result<Option<User>, DataError>>>,
    subscription: Option<Subscription>,
    settled: bool,
}

impl OneShot {
    /// Deliver the first result and hand back the subscription to cancel,
    /// if registration has already stored it.
    fn settle(&mut self, result: Result<Option<User>, DataError>) -> Option<Subscription> {
        if self.settled {
            return None;
        }
        self.settled = true;
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(result);
        }
        self.subscription.take()
    }
}

impl DataProvider for AuthProvider {
    type Value = Option<User>;

    fn cache_key(&self) -> &str {
        AUTH_CACHE_KEY
    }

    fn load_once(&self) -> BoxFuture<'static, Result<Option<User>, DataError>> {
        let backend = Arc::clone(&self.backend);
        async move {
            let (tx, rx) = oneshot::channel();
            let slot = Arc::new(Mutex::new(OneShot {
                sender: Some(tx),
                subscription: None,
                settled: false,
            }));

            let next_slot = Arc::clone(&slot);
            let on_next: OnNext<Option<User>> = Arc::new(move |user| {
                let sub = next_slot
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .settle(Ok(user));
                if let Some(sub) = sub {
                    sub.unsubscribe();
                }
            });
            let error_slot = Arc::clone(&slot);
            let on_error: OnError = Arc::new(move |err| {
                let sub = error_slot
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .settle(Err(err));
                if let Some(sub) = sub {
                    sub.unsubscribe();
                }
            });

            let subscription = backend.on_auth_state_changed(on_next, on_error);

            // The listener may have fired during registration; in that case
            // nobody else will cancel it.
            let leftover = {
                let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if guard.settled {
                    Some(subscription)
                } else {
                    guard.subscription = Some(subscription);
                    None
                }
            };
            if let Some(subscription) = leftover {
                debug!("auth listener fired during registration");
                subscription.unsubscribe();
            }
            rx.await.unwrap_or(Err(DataError::Disconnected))
        }
        .boxed()
    }

    fn subscribe(&self, on_next: OnNext<Option<User>>, on_error: OnError) -> Subscription {
        self.backend.on_auth_state_changed(on_next, on_error)
    }
}
