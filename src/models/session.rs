use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use crate::activity::ActivityHub;
use crate::auth::InMemoryAuth;
use crate::boundary::SessionBoundary;
use crate::notify::NoticeLog;
use crate::routing::HistoryNavigator;

/// Represents one signed-in dashboard session held by the host.
///
/// Everything here is scoped to a single browser session and is never shared
/// between sessions.
#[derive(Debug)]
pub struct HostSession {
    /// The session ID carried in the `session_id` cookie.
    pub id: Uuid,
    /// The user this session belongs to.
    pub username: String,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the session cookie expires.
    pub expires_at: DateTime<Utc>,
    /// Authentication state of the session.
    pub auth: Arc<InMemoryAuth>,
    /// Activity signals reported by the client.
    pub hub: ActivityHub,
    /// The client's navigation history.
    pub navigator: Arc<HistoryNavigator>,
    /// Toasts waiting to be shown.
    pub notices: Arc<NoticeLog>,
    /// The protected dashboard boundary.
    pub boundary: Arc<SessionBoundary>,
    /// Stops the boundary's run loop when flipped or dropped.
    pub shutdown: watch::Sender<bool>,
}

impl HostSession {
    /// Whether the host can forget this session.
    pub fn is_finished(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
            || matches!(
                self.boundary.view(),
                crate::boundary::BoundaryView::Redirected { .. }
            )
    }

    /// Stops the boundary and detaches every activity listener.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
        self.boundary.dispose();
        self.hub.close();
    }
}
