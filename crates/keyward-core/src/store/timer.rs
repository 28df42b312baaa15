//! Per-key lease expiry timers

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Handle to a scheduled expiry.
///
/// Dropping the handle cancels the timer, so replacing a key's handle is
/// enough to cancel the previous lease. Cancellation is best effort: a timer
/// that already woke up still runs, and its callback must re-validate state.
pub(crate) struct ExpiryTimer {
    id: u64,
    handle: Option<JoinHandle<()>>,
}

impl ExpiryTimer {
    /// Run `on_expire` once `delay` has elapsed
    pub fn schedule<F>(id: u64, delay: Duration, on_expire: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_expire.await;
        });
        Self {
            id,
            handle: Some(handle),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Forget the handle without aborting; used by the timer's own callback
    pub fn disarm(mut self) {
        self.handle.take();
    }
}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Source of timer ids, unique per store
#[derive(Default)]
pub(crate) struct TimerIds(AtomicU64);

impl TimerIds {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}
