//! # Users API Handlers
//!
//! Account management under the role-escalation rules of [`crate::policy`].
//! Loading happens here; every allow/deny decision is made by the policy.

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{StatusCode, header::LOCATION},
    response::Json,
};
use uuid::Uuid;

use crate::auth::Session;
use crate::error::{ApiError, RepositoryError, field_error};
use crate::handlers::types::{CreateUserRequest, TenantScopeQuery, UpdateUserRequest, UserResponse};
use crate::models::user;
use crate::policy::{self, UserChange, UserTarget};
use crate::repositories::{NewUser, UserRepository, UserUpdate};
use crate::server::AppState;

async fn load_user(state: &AppState, id: Uuid) -> Result<user::Model, ApiError> {
    Ok(UserRepository::new(&state.db)
        .find_by_id(id)
        .await?
        .ok_or_else(|| RepositoryError::not_found("User"))?)
}

/// List accounts of a tenant
#[utoipa::path(
    get,
    path = "/api/users",
    security(("session_cookie" = [])),
    params(TenantScopeQuery),
    responses(
        (status = 200, description = "Accounts, newest first", body = Vec<UserResponse>),
        (status = 401, description = "No valid session", body = ApiError),
        (status = 403, description = "Caller may not list accounts of this tenant", body = ApiError)
    ),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    Session(session): Session,
    Query(query): Query<TenantScopeQuery>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let scope = policy::user_listing_scope(&session, query.tenant_id)?;
    let users = UserRepository::new(&state.db).list(scope).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// Get an account by ID
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    security(("session_cookie" = [])),
    params(("id" = Uuid, Path, description = "User UUID")),
    responses(
        (status = 200, description = "Account", body = UserResponse),
        (status = 401, description = "No valid session", body = ApiError),
        (status = 403, description = "Caller may not read this account", body = ApiError),
        (status = 404, description = "User not found", body = ApiError)
    ),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    Session(session): Session,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, ApiError> {
    let target = load_user(&state, id).await?;
    policy::authorize_user_read(&session, &UserTarget::from(&target))?;
    Ok(Json(target.into()))
}

/// Create an account
#[utoipa::path(
    post,
    path = "/api/users",
    security(("session_cookie" = [])),
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "No valid session", body = ApiError),
        (status = 403, description = "Caller may not create this account", body = ApiError),
        (status = 409, description = "Email already in use", body = ApiError)
    ),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    Session(session): Session,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, [(axum::http::HeaderName, String); 1], Json<UserResponse>), ApiError> {
    let Json(request) = payload?;
    let tenant_id = request
        .tenant_id
        .or(session.tenant_id)
        .ok_or_else(|| field_error("tenantId", "Tenant is required"))?;

    policy::authorize_user_create(&session, request.role, tenant_id)?;

    let created = UserRepository::new(&state.db)
        .create(NewUser {
            email: request.email,
            name: request.name,
            password: request.password,
            role: request.role,
            tenant_id,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        [(LOCATION, format!("/api/users/{}", created.id))],
        Json(created.into()),
    ))
}

/// Update an account
#[utoipa::path(
    patch,
    path = "/api/users/{id}",
    security(("session_cookie" = [])),
    params(("id" = Uuid, Path, description = "User UUID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated account", body = UserResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "No valid session", body = ApiError),
        (status = 403, description = "Caller may not make this change", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
        (status = 409, description = "Email already in use", body = ApiError)
    ),
    tag = "users"
)]
pub async fn update_user(
    State(state): State<AppState>,
    Session(session): Session,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let Json(request) = payload?;
    let target = load_user(&state, id).await?;

    policy::authorize_user_update(
        &session,
        &UserTarget::from(&target),
        &UserChange {
            role: request.role,
            is_active: request.is_active,
        },
    )?;

    let updated = UserRepository::new(&state.db)
        .update(
            target,
            UserUpdate {
                email: request.email,
                name: request.name,
                password: request.password,
                role: request.role,
                is_active: request.is_active,
            },
        )
        .await?;

    Ok(Json(updated.into()))
}

/// Delete an account
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    security(("session_cookie" = [])),
    params(("id" = Uuid, Path, description = "User UUID")),
    responses(
        (status = 204, description = "Account deleted"),
        (status = 401, description = "No valid session", body = ApiError),
        (status = 403, description = "Caller may not delete this account", body = ApiError),
        (status = 404, description = "User not found", body = ApiError)
    ),
    tag = "users"
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Session(session): Session,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let target = load_user(&state, id).await?;
    policy::authorize_user_delete(&session, &UserTarget::from(&target))?;

    UserRepository::new(&state.db).delete(target).await?;
    Ok(StatusCode::NO_CONTENT)
}
