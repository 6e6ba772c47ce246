//! # API Types
//!
//! Request and response bodies shared by the administrative handlers. All
//! payloads use camelCase field names.

use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::SessionUser;
use crate::models::{DeploymentStatus, PageStatus, Role, deployment, page, tenant, user};
use crate::repositories::TenantWithCounts;

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`).
pub fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn utc(timestamp: DateTimeWithTimeZone) -> DateTime<Utc> {
    timestamp.with_timezone(&Utc)
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "admin@acme.test")]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub user: SessionUser,
}

// ---------------------------------------------------------------------------
// Tenants
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTenantRequest {
    #[schema(example = "Acme")]
    pub name: String,
    /// Derived from the name when omitted
    pub slug: Option<String>,
    #[schema(example = "acme.test")]
    pub domain: String,
    #[serde(default)]
    pub domains: Vec<String>,
    /// Display settings: logo, primaryColor, description
    #[schema(value_type = Option<Object>)]
    pub settings: Option<Value>,
    /// `owner/repo` of the site's build repository
    pub build_repository: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTenantRequest {
    pub name: Option<String>,
    pub domains: Option<Vec<String>>,
    #[schema(value_type = Option<Object>)]
    pub settings: Option<Value>,
    pub is_active: Option<bool>,
    /// `null` clears the repository
    #[serde(default, deserialize_with = "deserialize_some")]
    #[schema(value_type = Option<String>)]
    pub build_repository: Option<Option<String>>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TenantResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub domain: String,
    pub domains: Vec<String>,
    #[schema(value_type = Object)]
    pub settings: Value,
    pub is_active: bool,
    pub build_repository: Option<String>,
    /// Only shown to SUPER_ADMIN and the tenant's ADMINs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_count: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantResponse {
    pub fn new(tenant: tenant::Model, reveal_api_key: bool) -> Self {
        Self {
            id: tenant.id,
            domains: tenant.alias_domains(),
            api_key: reveal_api_key.then(|| tenant.api_key.clone()),
            page_count: None,
            user_count: None,
            created_at: utc(tenant.created_at),
            updated_at: utc(tenant.updated_at),
            name: tenant.name,
            slug: tenant.slug,
            domain: tenant.domain,
            settings: tenant.settings,
            is_active: tenant.is_active,
            build_repository: tenant.build_repository,
        }
    }

    pub fn with_counts(entry: TenantWithCounts, reveal_api_key: bool) -> Self {
        Self {
            page_count: Some(entry.page_count),
            user_count: Some(entry.user_count),
            ..Self::new(entry.tenant, reveal_api_key)
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyResponse {
    pub tenant_id: Uuid,
    #[schema(example = "sk_3kTz9QpX2mWbH7cLrV5nJ8dYf1gA4eUo")]
    pub api_key: String,
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

/// Tenant filter of administrative listings.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct TenantScopeQuery {
    /// Defaults to the caller's tenant; SUPER_ADMIN may omit it to see all
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePageRequest {
    pub tenant_id: Uuid,
    #[schema(example = "about")]
    pub slug: String,
    #[schema(example = "About us")]
    pub title: String,
    pub description: Option<String>,
    /// Template-dependent document: `{html, image?, excerpt?, json?}`
    #[schema(value_type = Option<Object>)]
    pub content: Option<Value>,
    #[schema(value_type = Option<Object>)]
    pub seo: Option<Value>,
    pub status: Option<PageStatus>,
    pub template: Option<String>,
    pub sort_order: Option<i32>,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePageRequest {
    pub slug: Option<String>,
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[schema(value_type = Option<Object>)]
    pub content: Option<Value>,
    #[schema(value_type = Option<Object>)]
    pub seo: Option<Value>,
    pub status: Option<PageStatus>,
    pub template: Option<String>,
    pub sort_order: Option<i32>,
    /// `null` detaches the page from its parent
    #[serde(default, deserialize_with = "deserialize_some")]
    #[schema(value_type = Option<String>)]
    pub parent_id: Option<Option<Uuid>>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = Object)]
    pub content: Value,
    #[schema(value_type = Object)]
    pub seo: Value,
    pub status: PageStatus,
    pub template: String,
    pub sort_order: i32,
    pub parent_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<page::Model> for PageResponse {
    fn from(page: page::Model) -> Self {
        Self {
            id: page.id,
            tenant_id: page.tenant_id,
            status: page.status(),
            published_at: page.published_at.map(utc),
            created_at: utc(page.created_at),
            updated_at: utc(page.updated_at),
            slug: page.slug,
            title: page.title,
            description: page.description,
            content: page.content,
            seo: page.seo,
            template: page.template,
            sort_order: page.sort_order,
            parent_id: page.parent_id,
            author_id: page.author_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[schema(example = "editor@acme.test")]
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: Role,
    /// Defaults to the caller's tenant
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    /// Re-hashed when present
    pub password: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

/// An account, without its password hash.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub tenant_id: Option<Uuid>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<user::Model> for UserResponse {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            role: user.role(),
            last_login_at: user.last_login_at.map(utc),
            created_at: utc(user.created_at),
            updated_at: utc(user.updated_at),
            email: user.email,
            name: user.name,
            tenant_id: user.tenant_id,
            is_active: user.is_active,
        }
    }
}

// ---------------------------------------------------------------------------
// Deployments
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub tenant_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeployAccepted {
    pub deployment_id: Uuid,
    pub status: DeploymentStatus,
}

/// Build outcome reported by the CI system. Fields are validated by hand so
/// the first offending one can be named.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeployCallbackRequest {
    #[schema(value_type = String)]
    pub deployment_id: Option<String>,
    /// SUCCESS or FAILED
    #[schema(example = "SUCCESS")]
    pub status: Option<String>,
    pub build_log: Option<String>,
    /// Build duration in seconds
    pub duration: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeployCallbackResponse {
    /// False when the deployment had already finished
    pub applied: bool,
    pub status: DeploymentStatus,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct DeploymentListQuery {
    /// Defaults to the caller's tenant; required for SUPER_ADMIN
    pub tenant_id: Option<Uuid>,
    /// Maximum number of records (default 20, max 100)
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub status: DeploymentStatus,
    pub triggered_by: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub build_log: Option<String>,
    pub duration: Option<i32>,
}

impl From<deployment::Model> for DeploymentResponse {
    fn from(deployment: deployment::Model) -> Self {
        Self {
            id: deployment.id,
            tenant_id: deployment.tenant_id,
            status: deployment.status(),
            triggered_by: deployment.triggered_by,
            started_at: utc(deployment.started_at),
            finished_at: deployment.finished_at.map(utc),
            build_log: deployment.build_log,
            duration: deployment.duration,
        }
    }
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMediaRequest {
    pub tenant_id: Uuid,
    pub url: String,
}

// ---------------------------------------------------------------------------
// Public gateway
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PublicPagesQuery {
    pub slug: Option<String>,
    pub template: Option<String>,
    /// Defaults to PUBLISHED
    pub status: Option<PageStatus>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PublicNewsQuery {
    pub slug: Option<String>,
    /// Default 20, max 100
    pub limit: Option<u64>,
}
