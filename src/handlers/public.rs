//! # Public Content API Handlers
//!
//! Read-only endpoints for the static site generator, authenticated by the
//! tenant API key in the `x-api-key` header.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Response,
};

use crate::error::ApiError;
use crate::gateway::{
    self, API_KEY_HEADER, CacheKey, MenuResponse, NewsResponse, PageQuery, PagesResponse,
    PublicGateway,
};
use crate::handlers::types::{PublicNewsQuery, PublicPagesQuery};
use crate::models::tenant;
use crate::server::AppState;

async fn tenant_for(state: &AppState, headers: &HeaderMap) -> Result<tenant::Model, ApiError> {
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    Ok(gateway::resolve_tenant(&state.db, api_key).await?)
}

/// Published pages of the key's tenant
///
/// With `slug`, returns that single page; otherwise every matching page in
/// navigation order.
#[utoipa::path(
    get,
    path = "/api/public/pages",
    params(
        PublicPagesQuery,
        ("x-api-key" = String, Header, description = "Tenant API key")
    ),
    responses(
        (status = 200, description = "Page or pages with tenant display settings", body = PagesResponse),
        (status = 401, description = "Missing or invalid API key", body = ApiError),
        (status = 404, description = "Page not found", body = ApiError)
    ),
    tag = "public"
)]
pub async fn pages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PublicPagesQuery>,
) -> Result<Response, ApiError> {
    let tenant = tenant_for(&state, &headers).await?;
    let query = PageQuery {
        slug: query.slug.filter(|slug| !slug.is_empty()),
        template: query.template.filter(|template| !template.is_empty()),
        status: query.status,
    };

    let key = CacheKey::new(tenant.id, query.cache_request());
    let body = gateway::cached_body(&state.public_cache, key, || async {
        PublicGateway::new(&state.db, &tenant).pages(&query).await
    })
    .await?;
    Ok(gateway::public_response(body, &state.public_cache))
}

/// Navigation menu of the key's tenant
#[utoipa::path(
    get,
    path = "/api/public/menu",
    params(("x-api-key" = String, Header, description = "Tenant API key")),
    responses(
        (status = 200, description = "Top-level published pages with their published children", body = MenuResponse),
        (status = 401, description = "Missing or invalid API key", body = ApiError)
    ),
    tag = "public"
)]
pub async fn menu(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let tenant = tenant_for(&state, &headers).await?;

    let key = CacheKey::new(tenant.id, "menu");
    let body = gateway::cached_body(&state.public_cache, key, || async {
        PublicGateway::new(&state.db, &tenant).menu().await
    })
    .await?;
    Ok(gateway::public_response(body, &state.public_cache))
}

/// News articles of the key's tenant, newest first
#[utoipa::path(
    get,
    path = "/api/public/news",
    params(
        PublicNewsQuery,
        ("x-api-key" = String, Header, description = "Tenant API key")
    ),
    responses(
        (status = 200, description = "Article or articles with the total count", body = NewsResponse),
        (status = 401, description = "Missing or invalid API key", body = ApiError),
        (status = 404, description = "Article not found", body = ApiError)
    ),
    tag = "public"
)]
pub async fn news(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PublicNewsQuery>,
) -> Result<Response, ApiError> {
    let tenant = tenant_for(&state, &headers).await?;
    let slug = query.slug.filter(|slug| !slug.is_empty());
    let limit = gateway::news_limit(query.limit);

    let key = CacheKey::new(
        tenant.id,
        format!("news|slug={}|limit={limit}", slug.as_deref().unwrap_or("")),
    );
    let body = gateway::cached_body(&state.public_cache, key, || async {
        PublicGateway::new(&state.db, &tenant)
            .news(slug.as_deref(), Some(limit))
            .await
    })
    .await?;
    Ok(gateway::public_response(body, &state.public_cache))
}
