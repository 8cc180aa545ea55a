// ── Core error types ──
//
// Every failure an upstream source can report collapses into `DataError`.
// The cache layer never inspects the variant; it only carries the value
// through to the failed `DataState`.

use thiserror::Error;

/// Failure reported by an auth stream or database listener.
///
/// `Clone` because one upstream error fans out to every subscriber of a
/// cache entry and is kept on the entry for later suspense reads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    // ── Upstream errors ──────────────────────────────────────────────
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Permission denied at {path}")]
    PermissionDenied { path: String },

    // ── One-shot fetch errors ────────────────────────────────────────
    #[error("Load failed: {message}")]
    Load { message: String },

    // ── Test injection ───────────────────────────────────────────────
    #[error("Simulated error: {message}")]
    Simulated { message: String },

    /// The upstream went away before delivering a result.
    #[error("Upstream source disconnected")]
    Disconnected,
}

impl DataError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn load(message: impl Into<String>) -> Self {
        Self::Load {
            message: message.into(),
        }
    }

    pub fn simulated(message: impl Into<String>) -> Self {
        Self::Simulated {
            message: message.into(),
        }
    }
}
