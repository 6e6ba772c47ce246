//! # Tenants API Handlers
//!
//! Tenant creation and reconfiguration (SUPER_ADMIN), scoped listing and API
//! key rotation.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header::LOCATION},
    response::Json,
};
use uuid::Uuid;

use crate::auth::{Session, SessionUser};
use crate::error::ApiError;
use crate::handlers::types::{
    ApiKeyResponse, CreateTenantRequest, TenantResponse, UpdateTenantRequest,
};
use crate::models::Role;
use crate::policy;
use crate::repositories::{NewTenant, TenantRepository, TenantUpdate};
use crate::server::AppState;

fn may_see_api_key(session: &SessionUser, tenant_id: Uuid) -> bool {
    policy::is_super_admin(session)
        || (session.role == Role::Admin && session.tenant_id == Some(tenant_id))
}

/// List tenants visible to the caller
#[utoipa::path(
    get,
    path = "/api/tenants",
    security(("session_cookie" = [])),
    responses(
        (status = 200, description = "Tenants ordered by name, with page and user counts", body = Vec<TenantResponse>),
        (status = 401, description = "No valid session", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn list_tenants(
    State(state): State<AppState>,
    Session(session): Session,
) -> Result<Json<Vec<TenantResponse>>, ApiError> {
    let scope = if policy::is_super_admin(&session) {
        None
    } else {
        match session.tenant_id {
            Some(own) => Some(own),
            None => return Ok(Json(Vec::new())),
        }
    };

    let tenants = TenantRepository::new(&state.db)
        .list_with_counts(scope)
        .await?
        .into_iter()
        .map(|entry| {
            let reveal = may_see_api_key(&session, entry.tenant.id);
            TenantResponse::with_counts(entry, reveal)
        })
        .collect();

    Ok(Json(tenants))
}

/// Create a tenant together with its index page
#[utoipa::path(
    post,
    path = "/api/tenants",
    security(("session_cookie" = [])),
    request_body = CreateTenantRequest,
    responses(
        (status = 201, description = "Tenant created", body = TenantResponse,
            headers(("Location", description = "URL of the created tenant"))),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "No valid session", body = ApiError),
        (status = 403, description = "Caller is not a super admin", body = ApiError),
        (status = 409, description = "Slug or domain already taken", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn create_tenant(
    State(state): State<AppState>,
    Session(session): Session,
    payload: Result<Json<CreateTenantRequest>, JsonRejection>,
) -> Result<(StatusCode, [(axum::http::HeaderName, String); 1], Json<TenantResponse>), ApiError> {
    policy::require_super_admin(&session)?;
    let Json(request) = payload?;

    let tenant = TenantRepository::new(&state.db)
        .create(NewTenant {
            name: request.name,
            slug: request.slug,
            domain: request.domain,
            domains: request.domains,
            settings: request.settings,
            build_repository: request.build_repository,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        [(LOCATION, format!("/api/tenants/{}", tenant.id))],
        Json(TenantResponse::new(tenant, true)),
    ))
}

/// Get a tenant by ID
#[utoipa::path(
    get,
    path = "/api/tenants/{id}",
    security(("session_cookie" = [])),
    params(("id" = Uuid, Path, description = "Tenant UUID")),
    responses(
        (status = 200, description = "Tenant", body = TenantResponse),
        (status = 401, description = "No valid session", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn get_tenant(
    State(state): State<AppState>,
    Session(session): Session,
    Path(id): Path<Uuid>,
) -> Result<Json<TenantResponse>, ApiError> {
    policy::require_visible(&session, id, "Tenant")?;
    let tenant = TenantRepository::new(&state.db).get(id).await?;
    Ok(Json(TenantResponse::new(tenant, may_see_api_key(&session, id))))
}

/// Reconfigure a tenant
#[utoipa::path(
    patch,
    path = "/api/tenants/{id}",
    security(("session_cookie" = [])),
    params(("id" = Uuid, Path, description = "Tenant UUID")),
    request_body = UpdateTenantRequest,
    responses(
        (status = 200, description = "Updated tenant", body = TenantResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "No valid session", body = ApiError),
        (status = 403, description = "Caller is not a super admin", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn update_tenant(
    State(state): State<AppState>,
    Session(session): Session,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateTenantRequest>, JsonRejection>,
) -> Result<Json<TenantResponse>, ApiError> {
    policy::require_super_admin(&session)?;
    let Json(request) = payload?;

    let tenant = TenantRepository::new(&state.db)
        .update(
            id,
            TenantUpdate {
                name: request.name,
                domains: request.domains,
                settings: request.settings,
                is_active: request.is_active,
                build_repository: request.build_repository,
            },
        )
        .await?;
    state.public_cache.invalidate_tenant(id).await;

    Ok(Json(TenantResponse::new(tenant, true)))
}

/// Replace the tenant's API key
#[utoipa::path(
    post,
    path = "/api/tenants/{id}/api-key",
    security(("session_cookie" = [])),
    params(("id" = Uuid, Path, description = "Tenant UUID")),
    responses(
        (status = 200, description = "New API key; the old one stops working", body = ApiKeyResponse),
        (status = 401, description = "No valid session", body = ApiError),
        (status = 403, description = "Caller is not an admin of this tenant", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn rotate_api_key(
    State(state): State<AppState>,
    Session(session): Session,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiKeyResponse>, ApiError> {
    policy::require_visible(&session, id, "Tenant")?;
    policy::require_tenant_admin(&session, id)?;

    let tenant = TenantRepository::new(&state.db).rotate_api_key(id).await?;

    Ok(Json(ApiKeyResponse {
        tenant_id: tenant.id,
        api_key: tenant.api_key,
    }))
}
