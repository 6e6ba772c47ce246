//! # Tenant Repository
//!
//! Creation, listing and reconfiguration of tenants, plus API key
//! resolution for the public gateway.

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::crypto::generate_api_key;
use crate::error::RepositoryError;
use crate::models::tenant::{self, ActiveModel as TenantActiveModel, Entity as Tenant};
use crate::models::{page, user};
use crate::repositories::page::PageRepository;
use crate::slug::{is_canonical_slug, slugify};

static DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?(\.[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?)*(:[0-9]{1,5})?$")
        .unwrap_or_else(|e| unreachable!("domain pattern is valid: {e}"))
});

static REPOSITORY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$")
        .unwrap_or_else(|e| unreachable!("repository pattern is valid: {e}"))
});

/// Input for creating a tenant.
#[derive(Debug, Clone, Default)]
pub struct NewTenant {
    pub name: String,
    /// Derived from the name when absent
    pub slug: Option<String>,
    pub domain: String,
    pub domains: Vec<String>,
    pub settings: Option<Value>,
    pub build_repository: Option<String>,
}

/// Partial update of a tenant. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct TenantUpdate {
    pub name: Option<String>,
    pub domains: Option<Vec<String>>,
    pub settings: Option<Value>,
    pub is_active: Option<bool>,
    /// `Some(None)` clears the repository
    pub build_repository: Option<Option<String>>,
}

/// A tenant with the number of pages and users it owns.
#[derive(Debug, Clone)]
pub struct TenantWithCounts {
    pub tenant: tenant::Model,
    pub page_count: u64,
    pub user_count: u64,
}

/// Repository for Tenant database operations
pub struct TenantRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> TenantRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a tenant with a fresh API key and its index page.
    ///
    /// The index page is created after the tenant commits; if that fails the
    /// tenant is kept and the failure is logged.
    pub async fn create(&self, request: NewTenant) -> Result<tenant::Model, RepositoryError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(RepositoryError::validation("name", "Name is required"));
        }
        if name.len() > 255 {
            return Err(RepositoryError::validation(
                "name",
                "Name cannot exceed 255 characters",
            ));
        }

        let slug = match request.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => {
                if !is_canonical_slug(slug) {
                    return Err(RepositoryError::validation(
                        "slug",
                        "Slug may contain only lowercase letters, digits and single hyphens",
                    ));
                }
                slug.to_string()
            }
            _ => slugify(&name),
        };
        if slug.is_empty() {
            return Err(RepositoryError::validation(
                "slug",
                "Could not derive a slug from the name",
            ));
        }

        let domain = normalize_domain(&request.domain)?;
        let domains = request
            .domains
            .iter()
            .map(|alias| normalize_domain(alias))
            .collect::<Result<Vec<_>, _>>()?;
        let settings = validate_settings(request.settings)?;
        let build_repository = validate_repository(request.build_repository)?;

        if self.find_by_slug(&slug).await?.is_some() {
            return Err(RepositoryError::Conflict(
                "A tenant with this slug already exists".to_string(),
            ));
        }
        if self.find_by_domain(&domain).await?.is_some() {
            return Err(RepositoryError::Conflict(
                "A tenant with this domain already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let created = TenantActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            slug: Set(slug),
            domain: Set(domain),
            domains: Set(json!(domains)),
            api_key: Set(generate_api_key()),
            settings: Set(settings),
            is_active: Set(true),
            build_repository: Set(build_repository),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(self.db)
        .await?;

        tracing::info!(
            tenant_id = %created.id,
            slug = %created.slug,
            domain = %created.domain,
            "Tenant created"
        );

        if let Err(e) = PageRepository::new(self.db).create_index_page(&created).await {
            tracing::warn!(tenant_id = %created.id, error = %e, "Failed to create index page");
        }

        Ok(created)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<tenant::Model>, RepositoryError> {
        Ok(Tenant::find_by_id(id).one(self.db).await?)
    }

    /// Tenant by id, or `NotFound`.
    pub async fn get(&self, id: Uuid) -> Result<tenant::Model, RepositoryError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Tenant"))
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<tenant::Model>, RepositoryError> {
        Ok(Tenant::find()
            .filter(tenant::Column::Slug.eq(slug))
            .one(self.db)
            .await?)
    }

    pub async fn find_by_domain(
        &self,
        domain: &str,
    ) -> Result<Option<tenant::Model>, RepositoryError> {
        Ok(Tenant::find()
            .filter(tenant::Column::Domain.eq(domain))
            .one(self.db)
            .await?)
    }

    /// Tenant owning `api_key`, whatever its active flag.
    pub async fn find_by_api_key(
        &self,
        api_key: &str,
    ) -> Result<Option<tenant::Model>, RepositoryError> {
        Ok(Tenant::find()
            .filter(tenant::Column::ApiKey.eq(api_key))
            .one(self.db)
            .await?)
    }

    /// Tenants ordered by name, restricted to `only` when given.
    pub async fn list_with_counts(
        &self,
        only: Option<Uuid>,
    ) -> Result<Vec<TenantWithCounts>, RepositoryError> {
        let mut query = Tenant::find().order_by_asc(tenant::Column::Name);
        if let Some(id) = only {
            query = query.filter(tenant::Column::Id.eq(id));
        }

        let tenants = query.all(self.db).await?;
        let mut listed = Vec::with_capacity(tenants.len());

        for tenant in tenants {
            let page_count = page::Entity::find()
                .filter(page::Column::TenantId.eq(tenant.id))
                .count(self.db)
                .await?;
            let user_count = user::Entity::find()
                .filter(user::Column::TenantId.eq(tenant.id))
                .count(self.db)
                .await?;
            listed.push(TenantWithCounts {
                tenant,
                page_count,
                user_count,
            });
        }

        Ok(listed)
    }

    pub async fn update(
        &self,
        id: Uuid,
        change: TenantUpdate,
    ) -> Result<tenant::Model, RepositoryError> {
        let existing = self.get(id).await?;
        let mut active = existing.into_active_model();

        if let Some(name) = change.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(RepositoryError::validation("name", "Name is required"));
            }
            active.name = Set(name);
        }
        if let Some(domains) = change.domains {
            let domains = domains
                .iter()
                .map(|alias| normalize_domain(alias))
                .collect::<Result<Vec<_>, _>>()?;
            active.domains = Set(json!(domains));
        }
        if let Some(settings) = change.settings {
            active.settings = Set(validate_settings(Some(settings))?);
        }
        if let Some(is_active) = change.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(repository) = change.build_repository {
            active.build_repository = Set(validate_repository(repository)?);
        }
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(self.db).await?;
        tracing::info!(tenant_id = %updated.id, is_active = updated.is_active, "Tenant updated");
        Ok(updated)
    }

    /// Replace the tenant's API key. The previous key stops working at once.
    pub async fn rotate_api_key(&self, id: Uuid) -> Result<tenant::Model, RepositoryError> {
        let mut active = self.get(id).await?.into_active_model();
        active.api_key = Set(generate_api_key());
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(self.db).await?;
        tracing::info!(tenant_id = %updated.id, "Tenant API key rotated");
        Ok(updated)
    }
}

fn normalize_domain(raw: &str) -> Result<String, RepositoryError> {
    let domain = raw.trim().to_ascii_lowercase();
    if domain.is_empty() {
        return Err(RepositoryError::validation("domain", "Domain is required"));
    }
    if !DOMAIN.is_match(&domain) {
        return Err(RepositoryError::validation(
            "domain",
            format!("'{domain}' is not a valid domain"),
        ));
    }
    Ok(domain)
}

fn validate_settings(settings: Option<Value>) -> Result<Value, RepositoryError> {
    match settings {
        None | Some(Value::Null) => Ok(json!({})),
        Some(Value::Object(map)) => Ok(Value::Object(map)),
        Some(_) => Err(RepositoryError::validation(
            "settings",
            "Settings must be an object",
        )),
    }
}

fn validate_repository(repository: Option<String>) -> Result<Option<String>, RepositoryError> {
    match repository.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(repository) if REPOSITORY.is_match(repository) => Ok(Some(repository.to_string())),
        Some(_) => Err(RepositoryError::validation(
            "buildRepository",
            "Build repository must look like owner/repo",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domains_are_normalized() {
        assert_eq!(normalize_domain(" Acme.TEST ").unwrap(), "acme.test");
        assert_eq!(normalize_domain("localhost:4321").unwrap(), "localhost:4321");
        assert!(normalize_domain("").is_err());
        assert!(normalize_domain("https://acme.test").is_err());
        assert!(normalize_domain("acme .test").is_err());
    }

    #[test]
    fn repository_must_be_owner_slash_repo() {
        assert_eq!(
            validate_repository(Some("acme/site".into())).unwrap(),
            Some("acme/site".into())
        );
        assert_eq!(validate_repository(Some("  ".into())).unwrap(), None);
        assert!(validate_repository(Some("acme".into())).is_err());
        assert!(validate_repository(Some("a/b/c".into())).is_err());
    }

    #[test]
    fn settings_default_to_empty_object() {
        assert_eq!(validate_settings(None).unwrap(), json!({}));
        assert!(validate_settings(Some(json!([1]))).is_err());
    }
}
