//! User-activity signals and the hub that dispatches them.
//!
//! The hub plays the part of the document: input sources call
//! [`ActivityHub::emit`], and listeners registered for a set of
//! [`ActivityKind`]s are invoked synchronously, in registration order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};

use crate::error::GuardError;

/// Kind of user input observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    PointerDown,
    PointerMove,
    KeyDown,
    Scroll,
    TouchStart,
}

impl ActivityKind {
    /// The fixed set of kinds a guard listens to.
    pub const ALL: [ActivityKind; 5] = [
        ActivityKind::PointerDown,
        ActivityKind::PointerMove,
        ActivityKind::KeyDown,
        ActivityKind::Scroll,
        ActivityKind::TouchStart,
    ];

    /// Pointer moves and scrolls arrive in bursts and are coalesced.
    pub fn is_high_frequency(self) -> bool {
        matches!(self, ActivityKind::PointerMove | ActivityKind::Scroll)
    }

    fn bit(self) -> u8 {
        match self {
            ActivityKind::PointerDown => 1,
            ActivityKind::PointerMove => 1 << 1,
            ActivityKind::KeyDown => 1 << 2,
            ActivityKind::Scroll => 1 << 3,
            ActivityKind::TouchStart => 1 << 4,
        }
    }
}

/// "Something happened now." Carries no payload beyond its kind; the guard
/// stamps it with its own clock when it is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySignal {
    pub kind: ActivityKind,
}

impl ActivitySignal {
    pub fn new(kind: ActivityKind) -> Self {
        Self { kind }
    }
}

type Listener = Arc<dyn Fn(&ActivitySignal) + Send + Sync>;

struct Entry {
    id: u64,
    mask: u8,
    listener: Listener,
}

#[derive(Default)]
struct HubInner {
    closed: bool,
    next_id: u64,
    entries: Vec<Entry>,
}

fn lock(inner: &Mutex<HubInner>) -> MutexGuard<'_, HubInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Source of activity signals for one session.
#[derive(Clone, Default)]
pub struct ActivityHub {
    inner: Arc<Mutex<HubInner>>,
}

impl std::fmt::Debug for ActivityHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("ActivityHub")
            .field("closed", &inner.closed)
            .field("listeners", &inner.entries.len())
            .finish()
    }
}

impl ActivityHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for the given kinds.
    ///
    /// The listener stays attached until the returned registration is
    /// removed or dropped.
    ///
    /// # Returns
    ///
    /// `GuardError::ListenerRegistration` if the hub is closed or `kinds` is empty.
    pub fn add_listener<F>(
        &self,
        kinds: &[ActivityKind],
        listener: F,
    ) -> Result<ListenerRegistration, GuardError>
    where
        F: Fn(&ActivitySignal) + Send + Sync + 'static,
    {
        let mask = kinds.iter().fold(0u8, |mask, kind| mask | kind.bit());
        if mask == 0 {
            return Err(GuardError::ListenerRegistration(
                "no activity kinds requested".to_string(),
            ));
        }

        let mut inner = lock(&self.inner);
        if inner.closed {
            return Err(GuardError::ListenerRegistration(
                "activity source is closed".to_string(),
            ));
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.push(Entry {
            id,
            mask,
            listener: Arc::new(listener),
        });
        tracing::debug!(listener = id, kinds = kinds.len(), "activity listener attached");

        Ok(ListenerRegistration {
            id,
            hub: Arc::downgrade(&self.inner),
        })
    }

    /// Dispatches a signal of `kind` to every matching listener.
    ///
    /// # Returns
    ///
    /// The number of listeners invoked.
    pub fn emit(&self, kind: ActivityKind) -> usize {
        let signal = ActivitySignal::new(kind);
        let targets: Vec<Listener> = {
            let inner = lock(&self.inner);
            if inner.closed {
                return 0;
            }
            inner
                .entries
                .iter()
                .filter(|entry| entry.mask & kind.bit() != 0)
                .map(|entry| entry.listener.clone())
                .collect()
        };

        for listener in &targets {
            listener(&signal);
        }

        targets.len()
    }

    /// Detaches every listener and refuses further registrations.
    pub fn close(&self) {
        let mut inner = lock(&self.inner);
        inner.closed = true;
        inner.entries.clear();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner).entries.len()
    }
}

/// Keeps a listener attached to its hub.
#[derive(Debug)]
pub struct ListenerRegistration {
    id: u64,
    hub: Weak<Mutex<HubInner>>,
}

impl ListenerRegistration {
    /// Detaches the listener. Idempotent.
    pub fn remove(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            let mut inner = lock(&hub);
            let before = inner.entries.len();
            inner.entries.retain(|entry| entry.id != self.id);
            if inner.entries.len() != before {
                tracing::debug!(listener = self.id, "activity listener detached");
            }
        }
        self.hub = Weak::new();
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn high_frequency_kinds() {
        assert!(ActivityKind::PointerMove.is_high_frequency());
        assert!(ActivityKind::Scroll.is_high_frequency());
        assert!(!ActivityKind::KeyDown.is_high_frequency());
        assert!(!ActivityKind::PointerDown.is_high_frequency());
        assert!(!ActivityKind::TouchStart.is_high_frequency());
    }

    #[tokio::test]
    async fn listeners_only_see_their_kinds() {
        let hub = ActivityHub::new();
        let keys = Arc::new(AtomicUsize::new(0));
        let seen = keys.clone();
        let _registration = hub
            .add_listener(&[ActivityKind::KeyDown], move |signal| {
                assert_eq!(signal.kind, ActivityKind::KeyDown);
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(hub.emit(ActivityKind::Scroll), 0);
        assert_eq!(hub.emit(ActivityKind::KeyDown), 1);
        assert_eq!(keys.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn removing_registration_detaches_listener() {
        let hub = ActivityHub::new();
        let mut registration = hub.add_listener(&ActivityKind::ALL, |_| {}).unwrap();
        assert_eq!(hub.listener_count(), 1);

        registration.remove();
        registration.remove();
        assert_eq!(hub.listener_count(), 0);
        assert_eq!(hub.emit(ActivityKind::PointerDown), 0);

        let other = hub.add_listener(&ActivityKind::ALL, |_| {}).unwrap();
        drop(other);
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn closed_hub_refuses_registration() {
        let hub = ActivityHub::new();
        hub.close();
        let err = hub.add_listener(&ActivityKind::ALL, |_| {}).unwrap_err();
        assert!(matches!(err, GuardError::ListenerRegistration(_)));
        assert!(hub.add_listener(&[], |_| {}).is_err());
    }
}
