use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{RwLock, watch};
use uuid::Uuid;

use crate::activity::ActivityHub;
use crate::auth::InMemoryAuth;
use crate::boundary::{BoundarySettings, SessionBoundary};
use crate::config::Config;
use crate::models::session::HostSession;
use crate::notify::NoticeLog;
use crate::routing::HistoryNavigator;

/// Path a signed-in client lands on.
pub const DASHBOARD_PATH: &str = "/dashboard";
/// Notices kept per session.
pub const NOTICE_CAPACITY: usize = 20;

/// The host's session registry.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<HostSession>>>>,
}

impl SessionRegistry {
    pub async fn get(&self, id: &Uuid) -> Option<Arc<HostSession>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn insert(&self, session: Arc<HostSession>) {
        self.sessions.write().await.insert(session.id, session);
    }

    /// Removes and closes a session.
    pub async fn remove(&self, id: &Uuid) -> Option<Arc<HostSession>> {
        let session = self.sessions.write().await.remove(id);
        if let Some(session) = &session {
            session.close();
        }
        session
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drops sessions that were redirected out or whose cookie expired.
    ///
    /// # Returns
    ///
    /// The number of sessions removed.
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| {
            if session.is_finished(now) {
                session.close();
                false
            } else {
                true
            }
        });
        before - sessions.len()
    }
}

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// The signed-in sessions.
    pub sessions: SessionRegistry,
}

impl AppState {
    /// Creates a new `AppState`.
    pub fn new(config: &Config) -> Self {
        tracing::info!(
            idle_timeout_ms = config.guard.idle_timeout().as_millis() as u64,
            warning_lead_ms = config.guard.warning_lead().as_millis() as u64,
            "✅ Session registry initialized"
        );

        AppState {
            config: config.clone(),
            sessions: SessionRegistry::default(),
        }
    }

    /// Signs `username` in and starts the boundary protecting their dashboard.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open_session(&self, username: String) -> Arc<HostSession> {
        let id = Uuid::new_v4();
        let auth = Arc::new(InMemoryAuth::new());
        let hub = ActivityHub::new();
        let navigator = Arc::new(HistoryNavigator::new(self.config.public_entry_path.clone()));
        navigator.push(DASHBOARD_PATH);
        let notices = Arc::new(NoticeLog::new(NOTICE_CAPACITY));

        let boundary = SessionBoundary::new(
            auth.clone(),
            navigator.clone(),
            notices.clone(),
            hub.clone(),
            BoundarySettings {
                guard: self.config.guard,
                public_entry_path: self.config.public_entry_path.clone(),
            },
        );

        auth.sign_in();
        boundary.evaluate();

        let (shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(boundary.clone().run(shutdown_rx));

        let now = Utc::now();
        let session = Arc::new(HostSession {
            id,
            username,
            created_at: now,
            expires_at: now + chrono::Duration::hours(self.config.session_duration_hours),
            auth,
            hub,
            navigator,
            notices,
            boundary,
            shutdown,
        });

        self.sessions.insert(session.clone()).await;
        tracing::info!("✅ Session opened: {}", id);
        session
    }
}
