//! Inactivity guard: drives [`machine`] with real timers and activity listeners.

pub mod machine;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::activity::{ActivityHub, ActivityKind, ActivitySignal, ListenerRegistration};
use crate::config::GuardConfig;
use crate::prompt::PromptActions;
use crate::timer::{ActivityTimer, TimerHandle};

pub use machine::{Effect, GuardEvent, GuardState, Phase, TimeoutDecision, Transition};

/// A callback invoked when the guard ends the session.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// What the guard calls when the session ends.
///
/// Both usually lead to the same logout; they are kept apart so callers can
/// tell an idle timeout from a user-initiated logout.
#[derive(Clone)]
pub struct GuardCallbacks {
    pub on_timeout: Callback,
    pub on_logout: Callback,
}

impl GuardCallbacks {
    pub fn new<T, L>(on_timeout: T, on_logout: L) -> Self
    where
        T: Fn() + Send + Sync + 'static,
        L: Fn() + Send + Sync + 'static,
    {
        Self {
            on_timeout: Arc::new(on_timeout),
            on_logout: Arc::new(on_logout),
        }
    }
}

impl fmt::Debug for GuardCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardCallbacks").finish_non_exhaustive()
    }
}

/// Read-only projection of a guard, safe to hand to views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GuardSnapshot {
    pub phase: Phase,
    pub show_timeout_modal: bool,
    pub fail_safe: bool,
    pub idle_ms: u64,
}

struct Inner {
    config: GuardConfig,
    state: GuardState,
    timer: ActivityTimer,
    warn: Option<TimerHandle>,
    expire: Option<TimerHandle>,
    prompt: watch::Sender<bool>,
    callbacks: GuardCallbacks,
    fail_safe: bool,
    disposed: bool,
}

fn lock(shared: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One running copy of the inactivity state machine.
///
/// Owns its timers and its activity listener exclusively. [`dispose`]
/// (also run on drop) cancels both timers and detaches the listener before
/// returning; nothing fires afterwards.
///
/// [`dispose`]: InactivityGuard::dispose
pub struct InactivityGuard {
    shared: Arc<Mutex<Inner>>,
    registration: Mutex<Option<ListenerRegistration>>,
}

impl fmt::Debug for InactivityGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.shared);
        f.debug_struct("InactivityGuard")
            .field("phase", &inner.state.phase)
            .field("generation", &inner.state.generation)
            .field("fail_safe", &inner.fail_safe)
            .field("disposed", &inner.disposed)
            .finish()
    }
}

impl InactivityGuard {
    /// Mounts a guard: attaches its activity listener to `hub` and arms the
    /// first warn timer.
    ///
    /// Must be called from within a tokio runtime. If the listener cannot be
    /// attached the guard runs without an automatic timeout and logs the
    /// failure.
    pub fn mount(config: GuardConfig, hub: &ActivityHub, callbacks: GuardCallbacks) -> Self {
        let now = Instant::now();
        let (prompt, _) = watch::channel(false);
        let shared = Arc::new(Mutex::new(Inner {
            config,
            state: GuardState::new(now),
            timer: ActivityTimer::new(),
            warn: None,
            expire: None,
            prompt,
            callbacks,
            fail_safe: false,
            disposed: false,
        }));

        let weak = Arc::downgrade(&shared);
        let registration = match hub.add_listener(&ActivityKind::ALL, move |signal| {
            if let Some(shared) = weak.upgrade() {
                dispatch(&shared, GuardEvent::Activity(*signal));
            }
        }) {
            Ok(registration) => {
                let mut inner = lock(&shared);
                let started = machine::start(&inner.config, now);
                inner.state = started.state;
                let fired = apply(&shared, &mut inner, started.effects);
                debug_assert!(fired.is_empty());
                tracing::info!(
                    idle_timeout_ms = config.idle_timeout().as_millis() as u64,
                    warning_lead_ms = config.warning_lead().as_millis() as u64,
                    "inactivity guard mounted"
                );
                Some(registration)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "activity listeners unavailable; automatic timeout disabled for this session"
                );
                lock(&shared).fail_safe = true;
                None
            }
        };

        Self {
            shared,
            registration: Mutex::new(registration),
        }
    }

    pub fn phase(&self) -> Phase {
        lock(&self.shared).state.phase
    }

    pub fn last_activity_at(&self) -> Instant {
        lock(&self.shared).state.last_activity_at
    }

    pub fn config(&self) -> GuardConfig {
        lock(&self.shared).config
    }

    /// Whether the timeout prompt should be visible.
    pub fn show_timeout_modal(&self) -> bool {
        *lock(&self.shared).prompt.borrow()
    }

    /// Subscribes to prompt visibility. Receivers are only notified when the
    /// value actually changes.
    pub fn watch_prompt(&self) -> watch::Receiver<bool> {
        lock(&self.shared).prompt.subscribe()
    }

    /// True when the guard could not attach its listener and never times out.
    pub fn is_fail_safe(&self) -> bool {
        lock(&self.shared).fail_safe
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.shared).disposed
    }

    pub fn snapshot(&self) -> GuardSnapshot {
        let inner = lock(&self.shared);
        GuardSnapshot {
            phase: inner.state.phase,
            show_timeout_modal: *inner.prompt.borrow(),
            fail_safe: inner.fail_safe,
            idle_ms: inner.state.last_activity_at.elapsed().as_millis() as u64,
        }
    }

    /// Feeds an activity signal directly, bypassing the hub.
    pub fn record_activity(&self, kind: ActivityKind) {
        dispatch(&self.shared, GuardEvent::Activity(ActivitySignal::new(kind)));
    }

    /// "Stay logged in": returns to `Active` and restarts the idle window.
    pub fn handle_stay_logged_in(&self) {
        dispatch(
            &self.shared,
            GuardEvent::Decision(TimeoutDecision::StayLoggedIn),
        );
    }

    /// "Logout now": ends the session and invokes `on_logout`.
    pub fn handle_logout(&self) {
        dispatch(&self.shared, GuardEvent::Decision(TimeoutDecision::LogoutNow));
    }

    /// Cancels pending timers, detaches the listener and hides the prompt.
    ///
    /// Synchronous and idempotent.
    pub fn dispose(&self) {
        let registration = self
            .registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(registration);

        let mut inner = lock(&self.shared);
        if inner.disposed {
            return;
        }
        inner.disposed = true;
        if let Some(handle) = inner.warn.take() {
            handle.cancel();
        }
        if let Some(handle) = inner.expire.take() {
            handle.cancel();
        }
        set_prompt(&inner.prompt, false);
        tracing::debug!(phase = ?inner.state.phase, "inactivity guard disposed");
    }
}

impl Drop for InactivityGuard {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl PromptActions for InactivityGuard {
    fn on_stay_logged_in(&self) {
        self.handle_stay_logged_in();
    }

    fn on_logout_now(&self) {
        self.handle_logout();
    }
}

/// Runs one event through the machine. Callbacks are invoked after the lock
/// is released so they may call back into the guard.
fn dispatch(shared: &Arc<Mutex<Inner>>, event: GuardEvent) {
    let fired = {
        let mut inner = lock(shared);
        if inner.disposed {
            return;
        }
        if inner.fail_safe && event != GuardEvent::Decision(TimeoutDecision::LogoutNow) {
            return;
        }

        let now = Instant::now();
        let Transition { state, effects } =
            machine::transition(&inner.state, &inner.config, event, now);

        if state.phase != inner.state.phase {
            tracing::info!(from = ?inner.state.phase, to = ?state.phase, "guard phase changed");
        } else if !effects.is_empty() {
            tracing::trace!(?event, generation = state.generation, "guard timers re-armed");
        }

        inner.state = state;
        apply(shared, &mut inner, effects)
    };

    for callback in fired {
        callback();
    }
}

fn apply(shared: &Arc<Mutex<Inner>>, inner: &mut Inner, effects: Vec<Effect>) -> Vec<Callback> {
    let mut fired = Vec::new();

    for effect in effects {
        match effect {
            Effect::ArmWarn { delay, generation } => {
                let weak = Arc::downgrade(shared);
                let handle = inner.timer.schedule(delay, move || {
                    fire(&weak, GuardEvent::WarnElapsed { generation })
                });
                if let Some(previous) = inner.warn.replace(handle) {
                    previous.cancel();
                }
            }
            Effect::ArmExpire { delay, generation } => {
                let weak = Arc::downgrade(shared);
                let handle = inner.timer.schedule(delay, move || {
                    fire(&weak, GuardEvent::ExpireElapsed { generation })
                });
                if let Some(previous) = inner.expire.replace(handle) {
                    previous.cancel();
                }
            }
            Effect::CancelWarn => {
                if let Some(handle) = inner.warn.take() {
                    handle.cancel();
                }
            }
            Effect::CancelExpire => {
                if let Some(handle) = inner.expire.take() {
                    handle.cancel();
                }
            }
            Effect::ShowPrompt => set_prompt(&inner.prompt, true),
            Effect::HidePrompt => set_prompt(&inner.prompt, false),
            Effect::Timeout => {
                tracing::info!("session idle timeout reached");
                fired.push(inner.callbacks.on_timeout.clone());
            }
            Effect::Logout => {
                tracing::info!("user chose to log out");
                fired.push(inner.callbacks.on_logout.clone());
            }
        }
    }

    fired
}

fn fire(weak: &Weak<Mutex<Inner>>, event: GuardEvent) {
    if let Some(shared) = weak.upgrade() {
        dispatch(&shared, event);
    }
}

fn set_prompt(prompt: &watch::Sender<bool>, visible: bool) {
    prompt.send_if_modified(|current| {
        let changed = *current != visible;
        *current = visible;
        changed
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counters {
        timeouts: Arc<AtomicUsize>,
        logouts: Arc<AtomicUsize>,
    }

    fn callbacks() -> (Counters, GuardCallbacks) {
        let timeouts = Arc::new(AtomicUsize::new(0));
        let logouts = Arc::new(AtomicUsize::new(0));
        let (t, l) = (timeouts.clone(), logouts.clone());
        (
            Counters { timeouts, logouts },
            GuardCallbacks::new(
                move || {
                    t.fetch_add(1, Ordering::SeqCst);
                },
                move || {
                    l.fetch_add(1, Ordering::SeqCst);
                },
            ),
        )
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[tokio::test(start_paused = true)]
    async fn reference_timeline_warns_then_expires() {
        let hub = ActivityHub::new();
        let (counters, callbacks) = callbacks();
        let guard = InactivityGuard::mount(GuardConfig::default(), &hub, callbacks);

        tokio::time::sleep(ms(269_999)).await;
        assert_eq!(guard.phase(), Phase::Active);
        assert!(!guard.show_timeout_modal());

        tokio::time::sleep(ms(2)).await;
        assert_eq!(guard.phase(), Phase::Warning);
        assert!(guard.show_timeout_modal());

        tokio::time::sleep(ms(30_000)).await;
        assert_eq!(guard.phase(), Phase::Expired);
        assert!(!guard.show_timeout_modal());
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 1);
        assert_eq!(counters.logouts.load(Ordering::SeqCst), 0);

        tokio::time::sleep(ms(600_000)).await;
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn longest_timeout_mounts_and_stays_active() {
        let hub = ActivityHub::new();
        let (counters, callbacks) = callbacks();
        let config = GuardConfig::new(crate::config::MAX_IDLE_TIMEOUT, Duration::from_secs(30)).unwrap();
        let guard = InactivityGuard::mount(config, &hub, callbacks);

        tokio::time::sleep(Duration::from_secs(86_400)).await;
        assert_eq!(guard.phase(), Phase::Active);
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stay_logged_in_restarts_the_window() {
        let hub = ActivityHub::new();
        let (counters, callbacks) = callbacks();
        let started = Instant::now();
        let guard = InactivityGuard::mount(GuardConfig::default(), &hub, callbacks);

        tokio::time::sleep(ms(280_000)).await;
        assert_eq!(guard.phase(), Phase::Warning);
        guard.handle_stay_logged_in();
        assert_eq!(guard.phase(), Phase::Active);
        assert!(!guard.show_timeout_modal());
        let since_start = guard.last_activity_at() - started;
        assert!(since_start >= ms(280_000) && since_start < ms(280_010));

        // the old expire deadline (t=300s) passes harmlessly
        tokio::time::sleep(ms(269_999)).await;
        assert_eq!(guard.phase(), Phase::Active);
        tokio::time::sleep(ms(2)).await;
        assert_eq!(guard.phase(), Phase::Warning);
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_activity_never_warns() {
        let hub = ActivityHub::new();
        let (counters, callbacks) = callbacks();
        let guard = InactivityGuard::mount(GuardConfig::default(), &hub, callbacks);
        let mut prompt = guard.watch_prompt();

        let kinds = [
            ActivityKind::PointerMove,
            ActivityKind::Scroll,
            ActivityKind::KeyDown,
            ActivityKind::TouchStart,
        ];
        for step in 0..40 {
            tokio::time::sleep(ms(200_000)).await;
            assert_eq!(hub.emit(kinds[step % kinds.len()]), 1);
            assert_eq!(guard.phase(), Phase::Active);
        }

        assert!(!prompt.has_changed().unwrap());
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pointer_move_burst_inside_window_still_defers_warning() {
        let hub = ActivityHub::new();
        let (_counters, callbacks) = callbacks();
        let guard = InactivityGuard::mount(GuardConfig::default(), &hub, callbacks);

        // inside the coalesce window of the mount-time arm
        tokio::time::sleep(ms(500)).await;
        hub.emit(ActivityKind::PointerMove);

        tokio::time::sleep(ms(269_900)).await;
        assert_eq!(guard.phase(), Phase::Active);
        tokio::time::sleep(ms(200)).await;
        assert_eq!(guard.phase(), Phase::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_during_warning_counts_as_stay() {
        let hub = ActivityHub::new();
        let (counters, callbacks) = callbacks();
        let guard = InactivityGuard::mount(GuardConfig::default(), &hub, callbacks);

        tokio::time::sleep(ms(299_000)).await;
        assert_eq!(guard.phase(), Phase::Warning);
        hub.emit(ActivityKind::PointerMove);
        assert_eq!(guard.phase(), Phase::Active);

        tokio::time::sleep(ms(5_000)).await;
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn logout_now_invokes_logout_once_and_never_prompts_again() {
        let hub = ActivityHub::new();
        let (counters, callbacks) = callbacks();
        let guard = InactivityGuard::mount(GuardConfig::default(), &hub, callbacks);

        tokio::time::sleep(ms(275_000)).await;
        guard.handle_logout();
        guard.handle_logout();
        assert_eq!(guard.phase(), Phase::Expired);
        assert!(!guard.show_timeout_modal());

        hub.emit(ActivityKind::KeyDown);
        guard.handle_stay_logged_in();
        tokio::time::sleep(ms(1_000_000)).await;

        assert_eq!(guard.phase(), Phase::Expired);
        assert!(!guard.show_timeout_modal());
        assert_eq!(counters.logouts.load(Ordering::SeqCst), 1);
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_cancels_everything() {
        let hub = ActivityHub::new();
        let (counters, callbacks) = callbacks();
        let guard = InactivityGuard::mount(GuardConfig::default(), &hub, callbacks);
        assert_eq!(hub.listener_count(), 1);

        tokio::time::sleep(ms(285_000)).await;
        assert!(guard.show_timeout_modal());

        guard.dispose();
        guard.dispose();
        assert_eq!(hub.listener_count(), 0);
        assert!(!guard.show_timeout_modal());
        assert!(guard.is_disposed());

        tokio::time::sleep(ms(1_000_000)).await;
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 0);
        assert_eq!(guard.phase(), Phase::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_detaches_listener() {
        let hub = ActivityHub::new();
        let (counters, callbacks) = callbacks();
        drop(InactivityGuard::mount(GuardConfig::default(), &hub, callbacks));

        assert_eq!(hub.listener_count(), 0);
        tokio::time::sleep(ms(1_000_000)).await;
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_hub_runs_fail_safe() {
        let hub = ActivityHub::new();
        hub.close();
        let (counters, callbacks) = callbacks();
        let guard = InactivityGuard::mount(GuardConfig::default(), &hub, callbacks);

        assert!(guard.is_fail_safe());
        guard.record_activity(ActivityKind::KeyDown);
        tokio::time::sleep(ms(1_000_000)).await;
        assert_eq!(guard.phase(), Phase::Active);
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 0);

        guard.handle_logout();
        assert_eq!(counters.logouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn callbacks_may_dispose_the_guard() {
        let hub = ActivityHub::new();
        let slot: Arc<Mutex<Option<Arc<InactivityGuard>>>> = Arc::new(Mutex::new(None));
        let inner_slot = slot.clone();
        let callbacks = GuardCallbacks::new(
            move || {
                if let Some(guard) = inner_slot.lock().unwrap().take() {
                    guard.dispose();
                }
            },
            || {},
        );
        let config = GuardConfig::new(Duration::from_secs(10), Duration::from_secs(2)).unwrap();
        let guard = Arc::new(InactivityGuard::mount(config, &hub, callbacks));
        *slot.lock().unwrap() = Some(guard.clone());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(guard.is_disposed());
        assert_eq!(guard.phase(), Phase::Expired);
        assert_eq!(hub.listener_count(), 0);
    }
}
