//! Protected-view wrapper: gates content on authentication and owns the
//! inactivity guard of the view it protects.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;

use crate::activity::ActivityHub;
use crate::auth::{AuthProvider, AuthSnapshot};
use crate::config::GuardConfig;
use crate::guard::{GuardCallbacks, InactivityGuard};
use crate::notify::{Notice, Notifier};
use crate::prompt::{PromptView, TimeoutPrompt};
use crate::routing::Navigator;

/// What the boundary currently renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum BoundaryView {
    Loading,
    Redirected { to: String },
    Protected,
}

/// Why a protected session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEnd {
    Idle,
    UserInitiated,
}

/// Product constants for a boundary.
#[derive(Debug, Clone)]
pub struct BoundarySettings {
    pub guard: GuardConfig,
    pub public_entry_path: String,
}

impl Default for BoundarySettings {
    fn default() -> Self {
        Self {
            guard: GuardConfig::default(),
            public_entry_path: "/login".to_string(),
        }
    }
}

struct BoundaryInner {
    view: BoundaryView,
    guard: Option<Arc<InactivityGuard>>,
    /// Set when the session was ended locally while the collaborator may
    /// still report it as authenticated.
    forced_out: bool,
    last_end: Option<SessionEnd>,
}

pub struct SessionBoundary {
    auth: Arc<dyn AuthProvider>,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    hub: ActivityHub,
    settings: BoundarySettings,
    inner: Mutex<BoundaryInner>,
}

impl std::fmt::Debug for SessionBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("SessionBoundary")
            .field("view", &inner.view)
            .field("guard_mounted", &inner.guard.is_some())
            .field("forced_out", &inner.forced_out)
            .finish()
    }
}

impl SessionBoundary {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn Notifier>,
        hub: ActivityHub,
        settings: BoundarySettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            auth,
            navigator,
            notifier,
            hub,
            settings,
            inner: Mutex::new(BoundaryInner {
                view: BoundaryView::Loading,
                guard: None,
                forced_out: false,
                last_end: None,
            }),
        })
    }

    pub fn view(&self) -> BoundaryView {
        self.lock().view.clone()
    }

    /// The mounted guard, if the protected content is showing.
    pub fn guard(&self) -> Option<Arc<InactivityGuard>> {
        self.lock().guard.clone()
    }

    /// The prompt as it should render right now.
    pub fn prompt(&self) -> Option<PromptView> {
        let guard = self.guard()?;
        TimeoutPrompt::render(guard.show_timeout_modal(), self.settings.guard.warning_lead())
    }

    pub fn last_end(&self) -> Option<SessionEnd> {
        self.lock().last_end
    }

    pub fn hub(&self) -> &ActivityHub {
        &self.hub
    }

    /// Re-reads the collaborator's state and mounts, unmounts or redirects.
    ///
    /// Idempotent: repeated calls with the same auth state change nothing
    /// and never redirect twice.
    pub fn evaluate(self: &Arc<Self>) -> BoundaryView {
        let snapshot = self.auth.snapshot();
        let mut redirect_to = None;

        let view = {
            let mut inner = self.lock();
            if !snapshot.is_authenticated {
                inner.forced_out = false;
            }

            let next = self.resolve(snapshot, inner.forced_out);

            if next == BoundaryView::Protected {
                if inner.guard.is_none() {
                    inner.guard = Some(Arc::new(self.mount_guard()));
                    inner.last_end = None;
                }
            } else if let Some(guard) = inner.guard.take() {
                guard.dispose();
            }

            if let BoundaryView::Redirected { to } = &next {
                if !matches!(inner.view, BoundaryView::Redirected { .. }) {
                    redirect_to = Some(to.clone());
                }
            }

            if inner.view != next {
                tracing::info!(from = ?inner.view, to = ?next, "session boundary changed view");
            }
            inner.view = next.clone();
            next
        };

        if let Some(path) = redirect_to {
            self.navigator.replace(&path);
        }

        view
    }

    /// Ends the protected session: unmounts the guard, asks the collaborator
    /// to log out and redirects, even if the logout call fails.
    pub fn end_session(&self, reason: SessionEnd) {
        let guard = {
            let mut inner = self.lock();
            if inner.view != BoundaryView::Protected {
                return;
            }
            inner.forced_out = true;
            inner.last_end = Some(reason);
            inner.guard.take()
        };

        if let Some(guard) = guard {
            guard.dispose();
        }

        tracing::info!(?reason, "ending protected session");

        let logged_out = match self.auth.logout() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, ?reason, "logout failed; closing the local session anyway");
                self.notifier.notify(Notice::warning(
                    "We could not reach the server to sign you out. \
                     Your session on this device has been closed.",
                ));
                false
            }
        };

        let redirect = {
            let mut inner = self.lock();
            if logged_out {
                inner.forced_out = false;
            }
            let to = self.settings.public_entry_path.clone();
            let already = matches!(inner.view, BoundaryView::Redirected { .. });
            inner.view = BoundaryView::Redirected { to: to.clone() };
            (!already).then_some(to)
        };

        if let Some(path) = redirect {
            self.navigator.replace(&path);
        }
    }

    /// Re-evaluates on every auth change until `shutdown` flips or its
    /// sender is dropped, then unmounts the guard.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut auth_rx = self.auth.subscribe();
        self.evaluate();

        loop {
            tokio::select! {
                changed = auth_rx.changed() => {
                    if changed.is_err() {
                        tracing::debug!("auth collaborator dropped; boundary stopping");
                        break;
                    }
                    self.evaluate();
                }
                _ = shutdown.changed() => break,
            }
        }

        self.dispose();
    }

    /// Unmounts the guard, stopping every timer and listener.
    pub fn dispose(&self) {
        let guard = self.lock().guard.take();
        if let Some(guard) = guard {
            guard.dispose();
        }
    }

    fn resolve(&self, snapshot: AuthSnapshot, forced_out: bool) -> BoundaryView {
        if !snapshot.is_initialized {
            BoundaryView::Loading
        } else if !snapshot.is_authenticated || forced_out {
            BoundaryView::Redirected {
                to: self.settings.public_entry_path.clone(),
            }
        } else {
            BoundaryView::Protected
        }
    }

    fn mount_guard(self: &Arc<Self>) -> InactivityGuard {
        let on_timeout = Arc::downgrade(self);
        let on_logout = Arc::downgrade(self);
        InactivityGuard::mount(
            self.settings.guard,
            &self.hub,
            GuardCallbacks::new(
                move || {
                    if let Some(boundary) = on_timeout.upgrade() {
                        boundary.end_session(SessionEnd::Idle);
                    }
                },
                move || {
                    if let Some(boundary) = on_logout.upgrade() {
                        boundary.end_session(SessionEnd::UserInitiated);
                    }
                },
            ),
        )
    }

    fn lock(&self) -> MutexGuard<'_, BoundaryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionBoundary {
    fn drop(&mut self) {
        self.dispose();
    }
}
