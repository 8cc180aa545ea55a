// ── In-memory backends ──
//
// Deterministic stand-ins for the auth and database services. Used by the
// test suites and the demo CLI.

mod auth;
mod database;

pub use auth::MemoryAuth;
pub use database::MemoryDatabase;
