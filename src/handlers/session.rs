use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    activity::ActivityKind,
    boundary::{BoundaryView, SessionEnd},
    error::{AppError, Result},
    guard::{GuardSnapshot, TimeoutDecision},
    models::session::HostSession,
    notify::Notice,
    prompt::PromptView,
};

/// The request payload for reporting user activity.
#[derive(Deserialize, Debug)]
pub struct ActivityRequest {
    pub kind: ActivityKind,
}

/// What the client should render for its session.
#[derive(Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub view: BoundaryView,
    pub location: String,
    pub guard: Option<GuardSnapshot>,
    pub prompt: Option<PromptView>,
    pub last_end: Option<SessionEnd>,
    pub notices: Vec<Notice>,
}

/// The response payload for reported activity.
#[derive(Serialize)]
pub struct ActivityResponse {
    pub delivered: usize,
}

fn session_response(session: &HostSession) -> SessionResponse {
    SessionResponse {
        view: session.boundary.view(),
        location: session.navigator.location(),
        guard: session.boundary.guard().map(|guard| guard.snapshot()),
        prompt: session.boundary.prompt(),
        last_end: session.boundary.last_end(),
        notices: session.notices.recent(),
    }
}

/// Returns the boundary view, guard projection and prompt of the session.
#[axum::debug_handler]
pub async fn get_session(Extension(session): Extension<Arc<HostSession>>) -> Result<Response> {
    Ok((StatusCode::OK, Json(session_response(&session))).into_response())
}

/// Reports one user-activity signal.
#[axum::debug_handler]
pub async fn report_activity(
    Extension(session): Extension<Arc<HostSession>>,
    Json(payload): Json<ActivityRequest>,
) -> Result<Response> {
    let delivered = session.hub.emit(payload.kind);
    tracing::debug!(kind = ?payload.kind, delivered, "activity reported");

    Ok((StatusCode::OK, Json(ActivityResponse { delivered })).into_response())
}

fn answer_prompt(session: &HostSession, decision: TimeoutDecision) -> Result<Response> {
    let guard = session
        .boundary
        .guard()
        .ok_or_else(|| AppError::Conflict("No protected view is mounted".to_string()))?;

    let prompt = session
        .boundary
        .prompt()
        .ok_or_else(|| AppError::Conflict("No timeout prompt is showing".to_string()))?;

    prompt.choose(decision, guard.as_ref());
    tracing::info!(?decision, "⏱️ Timeout prompt answered for user: {}", session.username);

    Ok((StatusCode::OK, Json(session_response(session))).into_response())
}

/// "Stay logged in" on the timeout prompt.
#[axum::debug_handler]
pub async fn stay_logged_in(Extension(session): Extension<Arc<HostSession>>) -> Result<Response> {
    answer_prompt(&session, TimeoutDecision::StayLoggedIn)
}

/// "Logout now" on the timeout prompt.
#[axum::debug_handler]
pub async fn logout_now(Extension(session): Extension<Arc<HostSession>>) -> Result<Response> {
    answer_prompt(&session, TimeoutDecision::LogoutNow)
}
