// ── Tri-state snapshot and reducer ──
//
// `DataState` is what every consumer observes. All transitions go through
// `reduce`, which is pure and owns no I/O.

use std::fmt;
use std::sync::Arc;

use crate::error::DataError;

// ── Retry ────────────────────────────────────────────────────────────

/// Zero-argument action carried by a failed state. Invoking it discards
/// the stale subscription and re-arms loading.
#[derive(Clone)]
pub struct Retry {
    action: Arc<dyn Fn() + Send + Sync>,
}

impl Retry {
    pub fn new(action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            action: Arc::new(action),
        }
    }

    /// A retry that does nothing. Useful for states built by hand.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn invoke(&self) {
        (self.action)();
    }
}

impl fmt::Debug for Retry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Retry(..)")
    }
}

// ── DataState ────────────────────────────────────────────────────────

/// Loading / failed / settled snapshot of one subscription.
///
/// The four variants are the only legal combinations of the
/// `loading` / `failed` flags. `error` exists iff the state is failed,
/// `retry` exists iff the state is failed and not loading.
#[derive(Debug, Clone)]
pub enum DataState<T> {
    /// Initial load or refetch. May carry the previous value.
    Loading { data: Option<T> },
    /// Retry in progress after a failure.
    Retrying { error: DataError, data: Option<T> },
    /// Terminal failure until `retry` is invoked.
    Failed {
        error: DataError,
        data: Option<T>,
        retry: Retry,
    },
    /// Settled success.
    Ready { data: T },
}

impl<T> DataState<T> {
    pub fn initial() -> Self {
        Self::Loading { data: None }
    }

    pub fn loading(&self) -> bool {
        matches!(self, Self::Loading { .. } | Self::Retrying { .. })
    }

    pub fn failed(&self) -> bool {
        matches!(self, Self::Retrying { .. } | Self::Failed { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Loading { data } | Self::Retrying { data, .. } | Self::Failed { data, .. } => {
                data.as_ref()
            }
            Self::Ready { data } => Some(data),
        }
    }

    pub fn error(&self) -> Option<&DataError> {
        match self {
            Self::Retrying { error, .. } | Self::Failed { error, .. } => Some(error),
            Self::Loading { .. } | Self::Ready { .. } => None,
        }
    }

    pub fn retry(&self) -> Option<&Retry> {
        match self {
            Self::Failed { retry, .. } => Some(retry),
            _ => None,
        }
    }

    fn into_data(self) -> Option<T> {
        match self {
            Self::Loading { data } | Self::Retrying { data, .. } | Self::Failed { data, .. } => {
                data
            }
            Self::Ready { data } => Some(data),
        }
    }
}

impl<T> Default for DataState<T> {
    fn default() -> Self {
        Self::initial()
    }
}

// ── Events ───────────────────────────────────────────────────────────

/// Input to [`reduce`].
#[derive(Debug, Clone)]
pub enum DataEvent<T> {
    BeginLoading,
    Value(T),
    Error { error: DataError, retry: Retry },
}

/// Fold one event into a state.
pub fn reduce<T>(state: DataState<T>, event: DataEvent<T>) -> DataState<T> {
    match event {
        DataEvent::BeginLoading => match state {
            DataState::Retrying { .. } => state,
            DataState::Failed { error, data, .. } => DataState::Retrying { error, data },
            other => DataState::Loading {
                data: other.into_data(),
            },
        },
        DataEvent::Value(data) => DataState::Ready { data },
        DataEvent::Error { error, retry } => DataState::Failed {
            error,
            data: state.into_data(),
            retry,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn failed(msg: &str, data: Option<u32>) -> DataState<u32> {
        DataState::Failed {
            error: DataError::transport(msg),
            data,
            retry: Retry::noop(),
        }
    }

    fn all_shapes() -> Vec<DataState<u32>> {
        vec![
            DataState::initial(),
            DataState::Loading { data: Some(1) },
            DataState::Retrying {
                error: DataError::transport("x"),
                data: Some(2),
            },
            failed("y", None),
            DataState::Ready { data: 3 },
        ]
    }

    #[test]
    fn begin_loading_then_value_always_settles() {
        for state in all_shapes() {
            let next = reduce(reduce(state, DataEvent::BeginLoading), DataEvent::Value(42));
            assert!(!next.loading());
            assert!(!next.failed());
            assert_eq!(next.data(), Some(&42));
            assert!(next.error().is_none());
            assert!(next.retry().is_none());
        }
    }

    #[test]
    fn error_then_begin_loading_keeps_error() {
        let err = DataError::transport("offline");
        let state = reduce(
            DataState::Ready { data: 7 },
            DataEvent::Error {
                error: err.clone(),
                retry: Retry::noop(),
            },
        );
        assert!(!state.loading());
        assert!(state.failed());
        assert!(state.retry().is_some());
        assert_eq!(state.data(), Some(&7));

        let state = reduce(state, DataEvent::BeginLoading);
        assert!(state.loading());
        assert!(state.failed());
        assert_eq!(state.error(), Some(&err));
        assert_eq!(state.data(), Some(&7));
        assert!(state.retry().is_none());
    }

    #[test]
    fn begin_loading_from_ready_keeps_stale_data() {
        let state = reduce(DataState::Ready { data: 5 }, DataEvent::BeginLoading);
        assert!(matches!(state, DataState::Loading { data: Some(5) }));
    }

    #[test]
    fn begin_loading_while_retrying_is_unchanged() {
        let state = DataState::Retrying {
            error: DataError::Disconnected,
            data: None::<u32>,
        };
        let next = reduce(state, DataEvent::BeginLoading);
        assert_eq!(next.error(), Some(&DataError::Disconnected));
        assert!(next.loading());
    }

    #[test]
    fn value_discards_previous_error() {
        let next = reduce(failed("gone", Some(1)), DataEvent::Value(2));
        assert!(matches!(next, DataState::Ready { data: 2 }));
    }

    #[test]
    fn flags_match_shape_invariants() {
        for state in all_shapes() {
            assert_eq!(state.error().is_some(), state.failed());
            assert_eq!(state.retry().is_some(), state.failed() && !state.loading());
        }
    }
}
