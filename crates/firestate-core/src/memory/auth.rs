// ── In-memory auth service ──

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::DataError;
use crate::model::User;
use crate::source::{AuthBackend, OnError, OnNext, Subscription};

struct Listener {
    id: u64,
    on_next: OnNext<Option<User>>,
    on_error: OnError,
}

#[derive(Default)]
struct AuthInner {
    initialized: bool,
    user: Option<User>,
    listeners: Vec<Listener>,
    next_id: u64,
}

/// Auth service that starts uninitialized, like a client that has not yet
/// restored its session.
///
/// Once initialized, new listeners are called back before
/// `on_auth_state_changed` returns.
#[derive(Default)]
pub struct MemoryAuth {
    inner: Arc<Mutex<AuthInner>>,
    registrations: AtomicUsize,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// An already-initialized service with `user` signed in.
    pub fn signed_in(user: User) -> Self {
        let auth = Self::new();
        {
            let mut inner = auth.lock();
            inner.initialized = true;
            inner.user = Some(user);
        }
        auth
    }

    /// Finish initialization (or change user) and notify every listener.
    pub fn resolve(&self, user: Option<User>) {
        let listeners: Vec<OnNext<Option<User>>> = {
            let mut inner = self.lock();
            inner.initialized = true;
            inner.user.clone_from(&user);
            inner
                .listeners
                .iter()
                .map(|l| Arc::clone(&l.on_next))
                .collect()
        };
        debug!(uid = ?user.as_ref().map(|u| &u.uid), "auth state changed");
        for on_next in listeners {
            on_next(user.clone());
        }
    }

    pub fn sign_in(&self, user: User) {
        self.resolve(Some(user));
    }

    pub fn sign_out(&self) {
        self.resolve(None);
    }

    /// Report `error` to every listener.
    pub fn fail(&self, error: &DataError) {
        let listeners: Vec<OnError> = self
            .lock()
            .listeners
            .iter()
            .map(|l| Arc::clone(&l.on_error))
            .collect();
        for on_error in listeners {
            on_error(error.clone());
        }
    }

    pub fn current_user(&self) -> Option<User> {
        self.lock().user.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Total `on_auth_state_changed` calls so far.
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, AuthInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AuthBackend for MemoryAuth {
    fn on_auth_state_changed(
        &self,
        on_next: OnNext<Option<User>>,
        on_error: OnError,
    ) -> Subscription {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        let (id, initial) = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.push(Listener {
                id,
                on_next: Arc::clone(&on_next),
                on_error,
            });
            (id, inner.initialized.then(|| inner.user.clone()))
        };

        if let Some(user) = initial {
            on_next(user);
        }

        let inner = Arc::clone(&self.inner);
        Subscription::new(move || {
            inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .listeners
                .retain(|l| l.id != id);
        })
    }
}
