//! Realtime database and auth subscriptions as loading / error / data state.
//!
//! - **[`LiveData`]**: Facade owning the backends and one
//!   [`CacheRegistry`] per value type. Hands out [`Binding`]s for the auth
//!   stream and for database queries.
//!
//! - **[`DataState`]**: The tri-state snapshot every consumer observes
//!   (`Loading`, `Retrying`, `Failed`, `Ready`). All transitions go through
//!   [`reduce`].
//!
//! - **[`CacheEntry`]**: One shared upstream subscription per cache key,
//!   fanned out to every consumer. Supports synchronous reads through
//!   [`ReadResult`] and error injection for tests.
//!
//! - **Sources** ([`source`]): The [`DataProvider`] contract plus the auth
//!   and database adapters built on [`AuthBackend`] / [`DatabaseBackend`].
//!   In-memory backends live in [`memory`].

pub mod binding;
pub mod cache;
pub mod config;
pub mod error;
pub mod live;
pub mod memory;
pub mod model;
pub mod source;
pub mod state;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use binding::Binding;
pub use cache::{CacheEntry, CacheRegistry, Dispatch, EntrySubscription, PendingRead, ReadResult};
pub use config::CacheConfig;
pub use error::DataError;
pub use live::LiveData;
pub use memory::{MemoryAuth, MemoryDatabase};
pub use model::{DataSnapshot, Limit, OrderBy, Query, User};
pub use source::{
    AuthBackend, AuthProvider, DataProvider, DatabaseBackend, DatabaseProvider, ListenerId,
    Subscription,
};
pub use state::{DataEvent, DataState, Retry, reduce};
pub use stream::StateStream;
