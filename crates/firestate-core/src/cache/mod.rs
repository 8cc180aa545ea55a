// ── Subscription cache ──
//
// Deduplicates identical subscriptions: one `CacheEntry` per cache key,
// looked up through a `CacheRegistry`.

mod entry;
mod registry;
mod schedule;

pub use entry::{CacheEntry, Dispatch, EntrySubscription, PendingRead, ReadResult};
pub use registry::CacheRegistry;
