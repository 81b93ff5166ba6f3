//! Session inactivity guard for a protected dashboard view.
//!
//! The core is [`guard::InactivityGuard`], an explicit `Active -> Warning ->
//! Expired` state machine driven by cancelable timers and user-activity
//! signals. [`boundary::SessionBoundary`] gates protected content on an
//! authentication collaborator and owns the guard; [`prompt::TimeoutPrompt`]
//! renders the warning. The remaining modules host guarded sessions over HTTP.

pub mod activity;
pub mod app;
pub mod auth;
pub mod boundary;
pub mod config;
pub mod error;
pub mod guard;
pub mod notify;
pub mod prompt;
pub mod routing;
pub mod state;
pub mod timer;

pub mod models {
    pub mod session;
}

pub mod handlers {
    pub mod auth;
    pub mod session;
}

pub mod middleware_layer {
    pub mod auth;
}

pub mod validation {
    pub mod session;
}

pub use activity::{ActivityHub, ActivityKind, ActivitySignal};
pub use auth::{AuthProvider, AuthSnapshot, InMemoryAuth};
pub use boundary::{BoundarySettings, BoundaryView, SessionBoundary, SessionEnd};
pub use config::GuardConfig;
pub use error::{AuthError, GuardError};
pub use guard::{GuardCallbacks, InactivityGuard, Phase, TimeoutDecision};
pub use prompt::{PromptActions, PromptView, TimeoutPrompt};
pub use routing::Navigator;
pub use timer::{ActivityTimer, TimerHandle};
