use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tower_cookies::cookie::time::Duration;
use tower_cookies::{Cookie, Cookies};

use crate::{
    boundary::SessionEnd,
    error::Result,
    middleware_layer::auth::SESSION_COOKIE,
    models::session::HostSession,
    state::{AppState, DASHBOARD_PATH},
    validation::session::session_owner,
};

/// The request payload for user login.
#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
}

/// The response payload for authentication-related requests.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    pub location: String,
}

/// Creates a session cookie with the given value and max age.
fn create_session_cookie(value: String, max_age_hours: i64) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, value);

    let is_production = std::env::var("APP_ENV")
        .unwrap_or_else(|_| "development".to_string())
        == "production";

    cookie.set_http_only(true);
    if is_production {
        cookie.set_secure(true);
    }

    cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
    cookie.set_max_age(Duration::hours(max_age_hours));
    cookie.set_path("/");

    cookie
}

/// Handles user login: opens a host session guarded for inactivity.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<LoginRequest>,
) -> Result<Response> {
    tracing::info!("🔐 Login attempt: {}", payload.username);
    let owner = session_owner(&payload.username)?;

    let session = state.open_session(owner).await;

    cookies.add(create_session_cookie(
        session.id.to_string(),
        state.config.session_duration_hours,
    ));
    tracing::info!("✅ User logged in: {}", session.username);

    let response = AuthResponse {
        success: true,
        message: "Login successful".to_string(),
        location: DASHBOARD_PATH.to_string(),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Handles user logout.
///
/// Goes through the guard when one is mounted so the logout is recorded as
/// user-initiated; the host session is dropped either way.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Arc<HostSession>>,
    cookies: Cookies,
) -> Result<Response> {
    tracing::info!("👋 Logout for user: {}", session.username);

    match session.boundary.guard() {
        Some(guard) => guard.handle_logout(),
        None => session.boundary.end_session(SessionEnd::UserInitiated),
    }

    let location = session.navigator.location();
    state.sessions.remove(&session.id).await;

    let mut session_cookie = Cookie::new(SESSION_COOKIE, "");
    session_cookie.set_max_age(Duration::seconds(0));
    session_cookie.set_path("/");
    cookies.remove(session_cookie);

    tracing::info!("✅ User logged out: {}", session.username);

    let response = AuthResponse {
        success: true,
        message: "Logout successful".to_string(),
        location,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}
