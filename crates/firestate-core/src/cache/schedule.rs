// ── Deferred work ──
//
// Delayed cancellation primitive used by cache entries: work is spawned to
// run after the current task yields (or after a delay), unless it is
// cancelled first.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Handle to work scheduled with [`Deferred::schedule`].
#[derive(Debug)]
pub(crate) struct Deferred {
    token: CancellationToken,
}

impl Deferred {
    /// Run `work` on the next scheduler tick, or after `delay` when it is
    /// non-zero.
    ///
    /// Outside a tokio runtime there is no tick to wait for, so `work` runs
    /// immediately and `None` is returned.
    pub(crate) fn schedule(delay: Duration, work: impl FnOnce() + Send + 'static) -> Option<Self> {
        let Ok(handle) = Handle::try_current() else {
            work();
            return None;
        };

        let token = CancellationToken::new();
        let task_token = token.clone();
        handle.spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    () = task_token.cancelled() => return,
                    () = tokio::time::sleep(delay) => {}
                }
            }
            if !task_token.is_cancelled() {
                work();
            }
        });
        Some(Self { token })
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }
}
