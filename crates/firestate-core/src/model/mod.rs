// ── Domain model ──
//
// Types the data sources hand to the cache layer: the authenticated user,
// database queries, and the snapshots they resolve to.

pub mod query;
pub mod snapshot;
pub mod user;

pub use query::{Limit, OrderBy, Query};
pub use snapshot::DataSnapshot;
pub use user::User;
