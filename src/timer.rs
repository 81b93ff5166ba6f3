//! One-shot, cancelable timers on top of the tokio runtime.
//!
//! Every call to [`ActivityTimer::schedule`] spawns its own task, so arming a
//! new timer never races with the cancellation of an old one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::AbortHandle;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Deadline used when `now + delay` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Opaque handle to one armed timer.
///
/// Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct TimerHandle {
    id: u64,
    state: Arc<AtomicU8>,
    abort: AbortHandle,
}

impl TimerHandle {
    /// Cancels the timer. No-op if it already fired or was already canceled.
    pub fn cancel(&self) {
        if self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.abort.abort();
            tracing::trace!(timer = self.id, "timer canceled");
        }
    }

    /// Whether the callback can still run.
    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Schedules delayed callbacks.
#[derive(Debug, Clone, Default)]
pub struct ActivityTimer {
    next_id: Arc<AtomicU64>,
}

impl ActivityTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a one-shot timer.
    ///
    /// Must be called from within a tokio runtime. The callback runs at most
    /// once, on the runtime, after `delay` has elapsed and only if the timer
    /// was not canceled first.
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(AtomicU8::new(PENDING));
        let task_state = state.clone();
        let now = tokio::time::Instant::now();
        let deadline = now.checked_add(delay).unwrap_or(now + FAR_FUTURE);

        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if task_state
                .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                tracing::trace!(timer = id, "timer fired");
                callback();
            }
        });

        tracing::trace!(timer = id, delay_ms = delay.as_millis() as u64, "timer armed");

        TimerHandle {
            id,
            state,
            abort: task.abort_handle(),
        }
    }

    /// Cancels `handle`. Safe to call any number of times.
    pub fn cancel(&self, handle: &TimerHandle) {
        handle.cancel();
    }
}
