//! # Pages API Handlers
//!
//! Tenant-scoped page management. Any member of a tenant may read its pages;
//! writes need SUPER_ADMIN or an ADMIN/EDITOR of the tenant. Every write
//! evicts the tenant from the public response cache.

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{StatusCode, header::LOCATION},
    response::Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{Session, SessionUser};
use crate::error::{ApiError, RepositoryError};
use crate::handlers::types::{CreatePageRequest, PageResponse, TenantScopeQuery, UpdatePageRequest};
use crate::models::{PageStatus, page};
use crate::policy;
use crate::repositories::{NewPage, PageRepository, PageUpdate};
use crate::server::AppState;

/// Load a page the caller can see. Pages of other tenants are reported as
/// missing.
async fn visible_page(
    state: &AppState,
    session: &SessionUser,
    id: Uuid,
) -> Result<page::Model, ApiError> {
    let page = PageRepository::new(&state.db)
        .find_by_id(id)
        .await?
        .ok_or_else(|| RepositoryError::not_found("Page"))?;
    policy::require_visible(session, page.tenant_id, "Page")?;
    Ok(page)
}

/// List pages of a tenant, any status
#[utoipa::path(
    get,
    path = "/api/pages",
    security(("session_cookie" = [])),
    params(TenantScopeQuery),
    responses(
        (status = 200, description = "Pages ordered by sort order, then title", body = Vec<PageResponse>),
        (status = 401, description = "No valid session", body = ApiError),
        (status = 403, description = "Tenant outside the caller's scope", body = ApiError)
    ),
    tag = "pages"
)]
pub async fn list_pages(
    State(state): State<AppState>,
    Session(session): Session,
    Query(query): Query<TenantScopeQuery>,
) -> Result<Json<Vec<PageResponse>>, ApiError> {
    let scope = policy::listing_scope(&session, query.tenant_id)?;
    let pages = PageRepository::new(&state.db).list(scope).await?;
    Ok(Json(pages.into_iter().map(PageResponse::from).collect()))
}

/// Get a page by ID
#[utoipa::path(
    get,
    path = "/api/pages/{id}",
    security(("session_cookie" = [])),
    params(("id" = Uuid, Path, description = "Page UUID")),
    responses(
        (status = 200, description = "Page", body = PageResponse),
        (status = 401, description = "No valid session", body = ApiError),
        (status = 404, description = "Page not found", body = ApiError)
    ),
    tag = "pages"
)]
pub async fn get_page(
    State(state): State<AppState>,
    Session(session): Session,
    Path(id): Path<Uuid>,
) -> Result<Json<PageResponse>, ApiError> {
    let page = visible_page(&state, &session, id).await?;
    Ok(Json(page.into()))
}

/// Create a page
#[utoipa::path(
    post,
    path = "/api/pages",
    security(("session_cookie" = [])),
    request_body = CreatePageRequest,
    responses(
        (status = 201, description = "Page created", body = PageResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "No valid session", body = ApiError),
        (status = 403, description = "Caller may not edit this tenant's pages", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError),
        (status = 409, description = "Slug already used in this tenant", body = ApiError)
    ),
    tag = "pages"
)]
pub async fn create_page(
    State(state): State<AppState>,
    Session(session): Session,
    payload: Result<Json<CreatePageRequest>, JsonRejection>,
) -> Result<(StatusCode, [(axum::http::HeaderName, String); 1], Json<PageResponse>), ApiError> {
    let Json(request) = payload?;
    policy::require_page_editor(&session, request.tenant_id)?;

    let defaults = NewPage::draft(request.tenant_id, request.slug, request.title);
    let page = PageRepository::new(&state.db)
        .create(NewPage {
            description: request.description,
            content: request.content.unwrap_or_else(|| json!({})),
            seo: request.seo.unwrap_or_else(|| json!({})),
            status: request.status.unwrap_or(PageStatus::Draft),
            template: request.template.unwrap_or(defaults.template.clone()),
            sort_order: request.sort_order.unwrap_or(0),
            parent_id: request.parent_id,
            author_id: Some(session.id),
            ..defaults
        })
        .await?;
    state.public_cache.invalidate_tenant(page.tenant_id).await;

    Ok((
        StatusCode::CREATED,
        [(LOCATION, format!("/api/pages/{}", page.id))],
        Json(page.into()),
    ))
}

/// Update a page
///
/// Moving a page into PUBLISHED stamps its publish time; later edits keep it.
#[utoipa::path(
    patch,
    path = "/api/pages/{id}",
    security(("session_cookie" = [])),
    params(("id" = Uuid, Path, description = "Page UUID")),
    request_body = UpdatePageRequest,
    responses(
        (status = 200, description = "Updated page", body = PageResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "No valid session", body = ApiError),
        (status = 403, description = "Caller may not edit this tenant's pages", body = ApiError),
        (status = 404, description = "Page not found", body = ApiError),
        (status = 409, description = "Slug already used in this tenant", body = ApiError)
    ),
    tag = "pages"
)]
pub async fn update_page(
    State(state): State<AppState>,
    Session(session): Session,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdatePageRequest>, JsonRejection>,
) -> Result<Json<PageResponse>, ApiError> {
    let Json(request) = payload?;
    let existing = visible_page(&state, &session, id).await?;
    policy::require_page_editor(&session, existing.tenant_id)?;

    let tenant_id = existing.tenant_id;
    let page = PageRepository::new(&state.db)
        .update(
            existing,
            PageUpdate {
                slug: request.slug,
                title: request.title,
                description: request.description,
                content: request.content,
                seo: request.seo,
                status: request.status,
                template: request.template,
                sort_order: request.sort_order,
                parent_id: request.parent_id,
            },
        )
        .await?;
    state.public_cache.invalidate_tenant(tenant_id).await;

    Ok(Json(page.into()))
}

/// Delete a page; its children are kept and moved to the top level
#[utoipa::path(
    delete,
    path = "/api/pages/{id}",
    security(("session_cookie" = [])),
    params(("id" = Uuid, Path, description = "Page UUID")),
    responses(
        (status = 204, description = "Page deleted"),
        (status = 401, description = "No valid session", body = ApiError),
        (status = 403, description = "Caller may not edit this tenant's pages", body = ApiError),
        (status = 404, description = "Page not found", body = ApiError)
    ),
    tag = "pages"
)]
pub async fn delete_page(
    State(state): State<AppState>,
    Session(session): Session,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let existing = visible_page(&state, &session, id).await?;
    policy::require_page_editor(&session, existing.tenant_id)?;

    let tenant_id = existing.tenant_id;
    PageRepository::new(&state.db).delete(existing).await?;
    state.public_cache.invalidate_tenant(tenant_id).await;

    Ok(StatusCode::NO_CONTENT)
}
