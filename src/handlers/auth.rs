//! # Auth API Handlers
//!
//! Login, logout and session introspection for the administrative surface.

use axum::{
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Json},
};

use crate::auth::{self, Session};
use crate::error::{ApiError, field_error};
use crate::handlers::types::{LoginRequest, SessionResponse};
use crate::server::AppState;

/// Exchange credentials for a session cookie
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; the session cookie is set", body = SessionResponse,
            headers(("Set-Cookie", description = "Session cookie"))),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "Invalid email or password", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    if request.email.trim().is_empty() {
        return Err(field_error("email", "Email is required"));
    }
    if request.password.is_empty() {
        return Err(field_error("password", "Password is required"));
    }

    let (user, token) =
        auth::login(&state.db, &state.sessions, request.email.trim(), &request.password).await?;

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, state.sessions.session_cookie(&token))],
        Json(SessionResponse { user }),
    ))
}

/// Drop the session cookie. Succeeds with or without a session.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 204, description = "Session cookie cleared")
    ),
    tag = "auth"
)]
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [(SET_COOKIE, state.sessions.expired_cookie())],
    )
}

/// The caller's session
#[utoipa::path(
    get,
    path = "/api/auth/session",
    security(("session_cookie" = [])),
    responses(
        (status = 200, description = "Current session", body = SessionResponse),
        (status = 401, description = "No valid session", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn session(Session(user): Session) -> Json<SessionResponse> {
    Json(SessionResponse { user })
}
