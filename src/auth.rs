//! The authentication collaborator consumed by the session boundary.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::watch;

use crate::error::AuthError;

/// The two flags the boundary gates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AuthSnapshot {
    pub is_initialized: bool,
    pub is_authenticated: bool,
}

/// Authentication state plus a logout trigger.
///
/// `logout` is a synchronous trigger. Clearing stored credentials and
/// notifying a server are the implementor's business.
pub trait AuthProvider: Send + Sync {
    fn snapshot(&self) -> AuthSnapshot;

    /// Receiver notified on every snapshot change.
    fn subscribe(&self) -> watch::Receiver<AuthSnapshot>;

    fn logout(&self) -> Result<(), AuthError>;
}

/// Auth state held in memory, for the host and for tests.
#[derive(Debug)]
pub struct InMemoryAuth {
    state: watch::Sender<AuthSnapshot>,
    fail_next_logout: AtomicBool,
    logout_calls: AtomicUsize,
}

impl Default for InMemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuth {
    /// Starts uninitialized: the session state is not known yet.
    pub fn new() -> Self {
        let (state, _) = watch::channel(AuthSnapshot::default());
        Self {
            state,
            fail_next_logout: AtomicBool::new(false),
            logout_calls: AtomicUsize::new(0),
        }
    }

    /// Marks the session state as known.
    pub fn initialize(&self, authenticated: bool) {
        self.set(AuthSnapshot {
            is_initialized: true,
            is_authenticated: authenticated,
        });
    }

    pub fn sign_in(&self) {
        self.initialize(true);
    }

    /// Makes the next `logout` fail, as if the server could not be reached.
    pub fn fail_next_logout(&self) {
        self.fail_next_logout.store(true, Ordering::SeqCst);
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    fn set(&self, next: AuthSnapshot) {
        self.state.send_if_modified(|current| {
            let changed = *current != next;
            *current = next;
            changed
        });
    }
}

impl AuthProvider for InMemoryAuth {
    fn snapshot(&self) -> AuthSnapshot {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.state.subscribe()
    }

    fn logout(&self) -> Result<(), AuthError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_next_logout.swap(false, Ordering::SeqCst) {
            return Err(AuthError::LogoutFailed("server unreachable".to_string()));
        }

        self.initialize(false);
        tracing::debug!("credentials cleared");
        Ok(())
    }
}
