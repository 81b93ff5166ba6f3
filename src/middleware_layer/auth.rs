use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

/// The name of the cookie carrying the host session ID.
pub const SESSION_COOKIE: &str = "session_id";

/// Extracts the session token from the request cookies.
///
/// # Arguments
///
/// * `cookies` - The request cookies.
///
/// # Returns
///
/// An `Option` containing the session ID if found.
pub fn extract_session_token(cookies: &Cookies) -> Option<Uuid> {
    cookies
        .get(SESSION_COOKIE)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

/// A middleware that requires a known, unexpired host session.
///
/// Inserts the `HostSession` into the request extensions.
pub async fn require_session(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    tracing::debug!("🔐 Checking session...");

    let Some(session_id) = extract_session_token(&cookies) else {
        tracing::warn!("❌ No session_id cookie found");
        return AppError::Unauthorized.into_response();
    };

    let Some(session) = state.sessions.get(&session_id).await else {
        tracing::warn!("❌ Unknown session: {}", session_id);
        return AppError::Unauthorized.into_response();
    };

    if chrono::Utc::now() > session.expires_at {
        tracing::warn!("❌ Session expired for user: {}", session.username);
        state.sessions.remove(&session_id).await;
        return AppError::Unauthorized.into_response();
    }

    tracing::debug!("✅ Session found for user: {}", session.username);

    request.extensions_mut().insert(session);

    next.run(request).await
}
