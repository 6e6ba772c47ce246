//! # Public Content Gateway
//!
//! Read-only access to a tenant's published content for the static site
//! generator. Callers authenticate with the tenant API key instead of a
//! session; every read is scoped to the tenant that key resolves to.
//!
//! Responses are serialized once and kept in [`PublicCache`] until they
//! expire or the tenant's content changes.

pub mod cache;

use std::collections::HashMap;
use std::future::Future;

use axum::body::{Body, Bytes};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::DatabaseConnection;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::content::{NEWS_TEMPLATE, PageDocument, unwrap_document};
use crate::error::{ApiError, RepositoryError, internal_error, not_found, unauthorized};
use crate::models::{PageStatus, page, tenant, user};
use crate::repositories::{PageRepository, TenantRepository};

pub use cache::{CacheKey, PublicCache};

/// Header carrying the tenant API key.
pub const API_KEY_HEADER: &str = "x-api-key";

pub const DEFAULT_NEWS_LIMIT: u64 = 20;
pub const MAX_NEWS_LIMIT: u64 = 100;

/// Author shown for news articles without a named author.
pub const FALLBACK_AUTHOR: &str = "Editorial Team";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Missing API key")]
    MissingKey,
    #[error("Invalid API key")]
    InvalidKey,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("failed to serialize response: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::MissingKey => unauthorized(Some("Missing API key")),
            GatewayError::InvalidKey => unauthorized(Some("Invalid API key")),
            GatewayError::NotFound(what) => not_found(&format!("{what} not found")),
            GatewayError::Repository(error) => error.into(),
            GatewayError::Serialization(error) => {
                tracing::error!(error = %error, "Failed to serialize public response");
                internal_error()
            }
        }
    }
}

/// Tenant owning `api_key`. Unknown keys and inactive tenants are
/// indistinguishable to the caller.
pub async fn resolve_tenant(
    db: &DatabaseConnection,
    api_key: Option<&str>,
) -> Result<tenant::Model, GatewayError> {
    let api_key = api_key
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(GatewayError::MissingKey)?;

    match TenantRepository::new(db).find_by_api_key(api_key).await? {
        Some(tenant) if tenant.is_active => Ok(tenant),
        Some(tenant) => {
            tracing::debug!(tenant_id = %tenant.id, "API key of inactive tenant presented");
            counter!("cms_public_auth_failures_total").increment(1);
            Err(GatewayError::InvalidKey)
        }
        None => {
            counter!("cms_public_auth_failures_total").increment(1);
            Err(GatewayError::InvalidKey)
        }
    }
}

/// Tenant display fields exposed publicly.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PublicTenant {
    pub name: String,
    pub domain: String,
    #[schema(value_type = Object)]
    pub settings: Value,
}

impl From<&tenant::Model> for PublicTenant {
    fn from(tenant: &tenant::Model) -> Self {
        Self {
            name: tenant.name.clone(),
            domain: tenant.domain.clone(),
            settings: tenant.settings.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PageLink {
    pub slug: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub template: String,
    pub sort_order: i32,
}

impl From<&page::Model> for PageSummary {
    fn from(page: &page::Model) -> Self {
        Self {
            id: page.id,
            slug: page.slug.clone(),
            title: page.title.clone(),
            description: page.description.clone(),
            template: page.template.clone(),
            sort_order: page.sort_order,
        }
    }
}

/// A page as served to the site generator.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicPage {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    /// Stored document, unwrapped to its object form
    #[schema(value_type = Object)]
    pub content: Value,
    #[schema(value_type = Object)]
    pub seo: Value,
    pub status: PageStatus,
    pub template: String,
    pub sort_order: i32,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub parent: Option<PageLink>,
    pub children: Vec<PageSummary>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(untagged)]
pub enum PagesResponse {
    One { tenant: PublicTenant, page: PublicPage },
    Many { tenant: PublicTenant, pages: Vec<PublicPage> },
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub template: String,
    pub sort_order: i32,
    pub children: Vec<PageSummary>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MenuResponse {
    pub tenant: PublicTenant,
    pub menu: Vec<MenuItem>,
}

/// A news article with its content unwrapped.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub image: Option<String>,
    pub content: String,
    pub author: String,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl NewsItem {
    fn new(page: &page::Model, author: Option<&user::Model>) -> Self {
        let (html, image, excerpt) = match PageDocument::decode(NEWS_TEMPLATE, &page.content) {
            PageDocument::News(doc) => (doc.html, doc.image, doc.excerpt),
            PageDocument::Standard(doc) => (doc.html, doc.image, None),
        };

        Self {
            id: page.id,
            slug: page.slug.clone(),
            title: page.title.clone(),
            excerpt: excerpt
                .filter(|excerpt| !excerpt.is_empty())
                .or_else(|| page.description.clone()),
            image,
            content: html,
            author: author
                .and_then(|author| author.name.clone())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| FALLBACK_AUTHOR.to_string()),
            published_at: page.published_at.map(utc),
            updated_at: utc(page.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(untagged)]
pub enum NewsResponse {
    One { tenant: PublicTenant, news: NewsItem },
    Many { tenant: PublicTenant, news: Vec<NewsItem>, total: u64 },
}

/// Filters of a public page read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageQuery {
    pub slug: Option<String>,
    pub template: Option<String>,
    pub status: Option<PageStatus>,
}

impl PageQuery {
    fn status(&self) -> PageStatus {
        self.status.unwrap_or(PageStatus::Published)
    }

    /// Stable cache discriminator for this query.
    pub fn cache_request(&self) -> String {
        format!(
            "pages|slug={}|template={}|status={}",
            self.slug.as_deref().unwrap_or(""),
            self.template.as_deref().unwrap_or(""),
            self.status()
        )
    }
}

/// Reads published content of one tenant.
pub struct PublicGateway<'a> {
    db: &'a DatabaseConnection,
    tenant: &'a tenant::Model,
}

impl<'a> PublicGateway<'a> {
    pub fn new(db: &'a DatabaseConnection, tenant: &'a tenant::Model) -> Self {
        Self { db, tenant }
    }

    pub async fn pages(&self, query: &PageQuery) -> Result<PagesResponse, GatewayError> {
        let pages = PageRepository::new(self.db);
        let tenant = PublicTenant::from(self.tenant);

        if let Some(slug) = query.slug.as_deref() {
            let page = pages
                .find_by_slug(self.tenant.id, slug, query.status(), query.template.as_deref())
                .await?
                .ok_or(GatewayError::NotFound("Page"))?;
            let mut rendered = self.render(vec![page]).await?;
            let page = rendered.pop().ok_or(GatewayError::NotFound("Page"))?;
            return Ok(PagesResponse::One { tenant, page });
        }

        let found = pages
            .list_with_status(self.tenant.id, query.status(), query.template.as_deref())
            .await?;
        Ok(PagesResponse::Many {
            tenant,
            pages: self.render(found).await?,
        })
    }

    pub async fn menu(&self) -> Result<MenuResponse, GatewayError> {
        let menu = PageRepository::new(self.db)
            .menu(self.tenant.id)
            .await?
            .into_iter()
            .map(|(root, children)| MenuItem {
                id: root.id,
                slug: root.slug,
                title: root.title,
                template: root.template,
                sort_order: root.sort_order,
                children: children.iter().map(PageSummary::from).collect(),
            })
            .collect();

        Ok(MenuResponse {
            tenant: PublicTenant::from(self.tenant),
            menu,
        })
    }

    pub async fn news(&self, slug: Option<&str>, limit: Option<u64>) -> Result<NewsResponse, GatewayError> {
        let pages = PageRepository::new(self.db);
        let tenant = PublicTenant::from(self.tenant);

        if let Some(slug) = slug {
            let (page, author) = pages
                .news_by_slug(self.tenant.id, slug)
                .await?
                .ok_or(GatewayError::NotFound("Article"))?;
            return Ok(NewsResponse::One {
                tenant,
                news: NewsItem::new(&page, author.as_ref()),
            });
        }

        let (items, total) = pages.news(self.tenant.id, news_limit(limit)).await?;
        Ok(NewsResponse::Many {
            tenant,
            news: items
                .iter()
                .map(|(page, author)| NewsItem::new(page, author.as_ref()))
                .collect(),
            total,
        })
    }

    /// Attach published parents and children to `found`.
    async fn render(&self, found: Vec<page::Model>) -> Result<Vec<PublicPage>, GatewayError> {
        let pages = PageRepository::new(self.db);

        let parent_ids: Vec<Uuid> = found.iter().filter_map(|page| page.parent_id).collect();
        let parents: HashMap<Uuid, page::Model> = pages
            .find_many(&parent_ids)
            .await?
            .into_iter()
            .filter(|parent| parent.tenant_id == self.tenant.id && parent.is_published())
            .map(|parent| (parent.id, parent))
            .collect();

        let ids: Vec<Uuid> = found.iter().map(|page| page.id).collect();
        let children = pages.published_children(&ids).await?;

        Ok(found
            .into_iter()
            .map(|page| PublicPage {
                parent: page
                    .parent_id
                    .and_then(|id| parents.get(&id))
                    .map(|parent| PageLink {
                        slug: parent.slug.clone(),
                        title: parent.title.clone(),
                    }),
                children: children
                    .iter()
                    .filter(|child| child.parent_id == Some(page.id))
                    .map(PageSummary::from)
                    .collect(),
                id: page.id,
                content: Value::Object(unwrap_document(&page.content)),
                status: page.status(),
                published_at: page.published_at.map(utc),
                updated_at: utc(page.updated_at),
                slug: page.slug,
                title: page.title,
                description: page.description,
                seo: page.seo,
                template: page.template,
                sort_order: page.sort_order,
            })
            .collect())
    }
}

/// Requested news limit clamped to `1..=100`, 20 when absent.
pub fn news_limit(requested: Option<u64>) -> u64 {
    requested
        .unwrap_or(DEFAULT_NEWS_LIMIT)
        .clamp(1, MAX_NEWS_LIMIT)
}

/// Serve `key` from the cache, or render it with `load` and remember it.
pub async fn cached_body<T, F, Fut>(
    cache: &PublicCache,
    key: CacheKey,
    load: F,
) -> Result<Bytes, GatewayError>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    if let Some(body) = cache.get(&key).await {
        counter!("cms_public_cache_hits_total").increment(1);
        return Ok(body);
    }

    counter!("cms_public_cache_misses_total").increment(1);
    let body = Bytes::from(serde_json::to_vec(&load().await?)?);
    cache.insert(key, body.clone()).await;
    Ok(body)
}

/// JSON response with the public caching headers.
pub fn public_response(body: Bytes, cache: &PublicCache) -> Response {
    let cache_control = format!("public, max-age={}", cache.ttl().as_secs());
    let mut response = (StatusCode::OK, Body::from(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if let Ok(value) = HeaderValue::from_str(&cache_control) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    response
}

fn utc(timestamp: DateTimeWithTimeZone) -> DateTime<Utc> {
    timestamp.with_timezone(&Utc)
}
