//! # Page Repository
//!
//! Page CRUD with the per-tenant slug and tree invariants checked at write
//! time, plus the ordered listings behind navigation and news.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set,
    TransactionTrait,
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::content::{NEWS_TEMPLATE, is_acceptable_document};
use crate::error::RepositoryError;
use crate::models::page::{self, ActiveModel as PageActiveModel, Entity as Page};
use crate::models::{PageStatus, tenant, user};

/// Longest ancestor chain walked when checking for cycles.
const MAX_TREE_DEPTH: usize = 64;

static PAGE_SLUG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._~/-]*$")
        .unwrap_or_else(|e| unreachable!("page slug pattern is valid: {e}"))
});

/// Input for creating a page.
#[derive(Debug, Clone)]
pub struct NewPage {
    pub tenant_id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub content: Value,
    pub seo: Value,
    pub status: PageStatus,
    pub template: String,
    pub sort_order: i32,
    pub parent_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
}

impl NewPage {
    /// A DRAFT page on the default template with empty content.
    pub fn draft(tenant_id: Uuid, slug: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            tenant_id,
            slug: slug.into(),
            title: title.into(),
            description: None,
            content: json!({}),
            seo: json!({}),
            status: PageStatus::Draft,
            template: "default".to_string(),
            sort_order: 0,
            parent_id: None,
            author_id: None,
        }
    }
}

/// Partial update of a page. `None` leaves a field untouched; the nested
/// options clear the field when `Some(None)`.
#[derive(Debug, Clone, Default)]
pub struct PageUpdate {
    pub slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub content: Option<Value>,
    pub seo: Option<Value>,
    pub status: Option<PageStatus>,
    pub template: Option<String>,
    pub sort_order: Option<i32>,
    pub parent_id: Option<Option<Uuid>>,
}

/// Repository for Page database operations
pub struct PageRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> PageRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, request: NewPage) -> Result<page::Model, RepositoryError> {
        let title = validate_title(&request.title)?;
        let slug = validate_slug(&request.slug)?;
        let template = validate_template(&request.template)?;
        validate_content(&request.content)?;
        let seo = validate_seo(request.seo)?;

        if tenant::Entity::find_by_id(request.tenant_id)
            .one(self.db)
            .await?
            .is_none()
        {
            return Err(RepositoryError::not_found("Tenant"));
        }

        self.ensure_slug_available(request.tenant_id, &slug, None)
            .await?;

        if let Some(parent_id) = request.parent_id {
            self.ensure_parent(request.tenant_id, parent_id).await?;
        }

        let now = Utc::now();
        let published_at = (request.status == PageStatus::Published).then(|| now.into());

        let created = PageActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(request.tenant_id),
            slug: Set(slug),
            title: Set(title),
            description: Set(normalize_description(request.description)),
            content: Set(request.content),
            seo: Set(seo),
            status: Set(request.status.as_str().to_string()),
            template: Set(template),
            sort_order: Set(request.sort_order),
            parent_id: Set(request.parent_id),
            author_id: Set(request.author_id),
            published_at: Set(published_at),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(self.db)
        .await?;

        tracing::info!(
            page_id = %created.id,
            tenant_id = %created.tenant_id,
            slug = %created.slug,
            status = %created.status,
            "Page created"
        );
        Ok(created)
    }

    /// The published home page every new tenant starts with.
    pub async fn create_index_page(
        &self,
        tenant: &tenant::Model,
    ) -> Result<page::Model, RepositoryError> {
        let html = format!(
            "<h1>Welcome to {}!</h1><p>This is the home page.</p>",
            escape_html(&tenant.name)
        );

        self.create(NewPage {
            status: PageStatus::Published,
            template: "home".to_string(),
            content: json!({ "html": html }),
            ..NewPage::draft(tenant.id, "index", "Home")
        })
        .await
    }

    /// Apply `change` to `existing`.
    ///
    /// Entering PUBLISHED from any other status stamps the publish time; the
    /// update time is refreshed on every call.
    pub async fn update(
        &self,
        existing: page::Model,
        change: PageUpdate,
    ) -> Result<page::Model, RepositoryError> {
        let was_published = existing.is_published();
        let page_id = existing.id;
        let tenant_id = existing.tenant_id;
        let current_slug = existing.slug.clone();
        let mut active = existing.into_active_model();

        if let Some(title) = change.title {
            active.title = Set(validate_title(&title)?);
        }
        if let Some(slug) = change.slug {
            let slug = validate_slug(&slug)?;
            if slug != current_slug {
                self.ensure_slug_available(tenant_id, &slug, Some(page_id))
                    .await?;
            }
            active.slug = Set(slug);
        }
        if let Some(description) = change.description {
            active.description = Set(normalize_description(description));
        }
        if let Some(content) = change.content {
            validate_content(&content)?;
            active.content = Set(content);
        }
        if let Some(seo) = change.seo {
            active.seo = Set(validate_seo(seo)?);
        }
        if let Some(template) = change.template {
            active.template = Set(validate_template(&template)?);
        }
        if let Some(sort_order) = change.sort_order {
            active.sort_order = Set(sort_order);
        }
        if let Some(parent_id) = change.parent_id {
            if let Some(parent_id) = parent_id {
                self.ensure_parent(tenant_id, parent_id).await?;
                self.ensure_not_ancestor(page_id, parent_id).await?;
            }
            active.parent_id = Set(parent_id);
        }

        let now = Utc::now();
        if let Some(status) = change.status {
            if status == PageStatus::Published && !was_published {
                active.published_at = Set(Some(now.into()));
            }
            active.status = Set(status.as_str().to_string());
        }
        active.updated_at = Set(now.into());

        let updated = active.update(self.db).await?;
        tracing::info!(
            page_id = %updated.id,
            tenant_id = %updated.tenant_id,
            status = %updated.status,
            "Page updated"
        );
        Ok(updated)
    }

    /// Delete a page. Its children stay, detached to the top level.
    pub async fn delete(&self, existing: page::Model) -> Result<(), RepositoryError> {
        let page_id = existing.id;
        let tenant_id = existing.tenant_id;
        let txn = self.db.begin().await?;

        let detached = Page::update_many()
            .col_expr(page::Column::ParentId, Expr::value(Option::<Uuid>::None))
            .col_expr(page::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(page::Column::ParentId.eq(page_id))
            .exec(&txn)
            .await?;

        existing.delete(&txn).await?;
        txn.commit().await?;

        tracing::info!(
            page_id = %page_id,
            tenant_id = %tenant_id,
            detached_children = detached.rows_affected,
            "Page deleted"
        );
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<page::Model>, RepositoryError> {
        Ok(Page::find_by_id(id).one(self.db).await?)
    }

    /// Pages of any status, in navigation order, for one tenant or all.
    pub async fn list(&self, tenant_id: Option<Uuid>) -> Result<Vec<page::Model>, RepositoryError> {
        let mut query = ordered(Page::find());
        if let Some(tenant_id) = tenant_id {
            query = query.filter(page::Column::TenantId.eq(tenant_id));
        }
        Ok(query.all(self.db).await?)
    }

    /// Pages of a tenant with `status`, optionally of one template, in
    /// navigation order.
    pub async fn list_with_status(
        &self,
        tenant_id: Uuid,
        status: PageStatus,
        template: Option<&str>,
    ) -> Result<Vec<page::Model>, RepositoryError> {
        let mut query = ordered(Page::find())
            .filter(page::Column::TenantId.eq(tenant_id))
            .filter(page::Column::Status.eq(status.as_str()));
        if let Some(template) = template {
            query = query.filter(page::Column::Template.eq(template));
        }
        Ok(query.all(self.db).await?)
    }

    pub async fn find_by_slug(
        &self,
        tenant_id: Uuid,
        slug: &str,
        status: PageStatus,
        template: Option<&str>,
    ) -> Result<Option<page::Model>, RepositoryError> {
        let mut query = Page::find()
            .filter(page::Column::TenantId.eq(tenant_id))
            .filter(page::Column::Slug.eq(slug))
            .filter(page::Column::Status.eq(status.as_str()));
        if let Some(template) = template {
            query = query.filter(page::Column::Template.eq(template));
        }
        Ok(query.one(self.db).await?)
    }

    /// PUBLISHED children of the given parents, in navigation order.
    pub async fn published_children(
        &self,
        parent_ids: &[Uuid],
    ) -> Result<Vec<page::Model>, RepositoryError> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }

        Ok(ordered(Page::find())
            .filter(page::Column::ParentId.is_in(parent_ids.iter().copied()))
            .filter(page::Column::Status.eq(PageStatus::Published.as_str()))
            .all(self.db)
            .await?)
    }

    pub async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<page::Model>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(Page::find()
            .filter(page::Column::Id.is_in(ids.iter().copied()))
            .all(self.db)
            .await?)
    }

    /// Top-level PUBLISHED pages, each with its PUBLISHED children.
    pub async fn menu(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<(page::Model, Vec<page::Model>)>, RepositoryError> {
        let roots = ordered(Page::find())
            .filter(page::Column::TenantId.eq(tenant_id))
            .filter(page::Column::Status.eq(PageStatus::Published.as_str()))
            .filter(page::Column::ParentId.is_null())
            .all(self.db)
            .await?;

        let root_ids: Vec<Uuid> = roots.iter().map(|page| page.id).collect();
        let children = self.published_children(&root_ids).await?;

        Ok(roots
            .into_iter()
            .map(|root| {
                let own = children
                    .iter()
                    .filter(|child| child.parent_id == Some(root.id))
                    .cloned()
                    .collect();
                (root, own)
            })
            .collect())
    }

    /// Newest PUBLISHED news articles with their authors, plus the total count.
    pub async fn news(
        &self,
        tenant_id: Uuid,
        limit: u64,
    ) -> Result<(Vec<(page::Model, Option<user::Model>)>, u64), RepositoryError> {
        let total = news_query(tenant_id).count(self.db).await?;
        let items = news_query(tenant_id)
            .order_by_desc(page::Column::PublishedAt)
            .order_by_asc(page::Column::Title)
            .limit(limit)
            .find_also_related(user::Entity)
            .all(self.db)
            .await?;
        Ok((items, total))
    }

    pub async fn news_by_slug(
        &self,
        tenant_id: Uuid,
        slug: &str,
    ) -> Result<Option<(page::Model, Option<user::Model>)>, RepositoryError> {
        Ok(news_query(tenant_id)
            .filter(page::Column::Slug.eq(slug))
            .find_also_related(user::Entity)
            .one(self.db)
            .await?)
    }

    async fn ensure_slug_available(
        &self,
        tenant_id: Uuid,
        slug: &str,
        except: Option<Uuid>,
    ) -> Result<(), RepositoryError> {
        let mut query = Page::find()
            .filter(page::Column::TenantId.eq(tenant_id))
            .filter(page::Column::Slug.eq(slug));
        if let Some(except) = except {
            query = query.filter(page::Column::Id.ne(except));
        }

        if query.one(self.db).await?.is_some() {
            return Err(RepositoryError::Conflict(
                "A page with this slug already exists".to_string(),
            ));
        }
        Ok(())
    }

    async fn ensure_parent(&self, tenant_id: Uuid, parent_id: Uuid) -> Result<(), RepositoryError> {
        match self.find_by_id(parent_id).await? {
            Some(parent) if parent.tenant_id == tenant_id => Ok(()),
            _ => Err(RepositoryError::validation(
                "parentId",
                "Parent page not found",
            )),
        }
    }

    /// Reject making `page_id` a descendant of itself.
    async fn ensure_not_ancestor(
        &self,
        page_id: Uuid,
        new_parent: Uuid,
    ) -> Result<(), RepositoryError> {
        ensure_acyclic(self.db, page_id, new_parent).await
    }
}

async fn ensure_acyclic<C: ConnectionTrait>(
    db: &C,
    page_id: Uuid,
    new_parent: Uuid,
) -> Result<(), RepositoryError> {
    let mut seen = HashSet::new();
    let mut cursor = Some(new_parent);

    while let Some(current) = cursor {
        if current == page_id {
            return Err(RepositoryError::validation(
                "parentId",
                "A page cannot be nested under itself or its descendants",
            ));
        }
        if !seen.insert(current) || seen.len() > MAX_TREE_DEPTH {
            break;
        }
        cursor = Page::find_by_id(current)
            .one(db)
            .await?
            .and_then(|page| page.parent_id);
    }

    Ok(())
}

fn news_query(tenant_id: Uuid) -> Select<Page> {
    Page::find().filter(
        Condition::all()
            .add(page::Column::TenantId.eq(tenant_id))
            .add(page::Column::Template.eq(NEWS_TEMPLATE))
            .add(page::Column::Status.eq(PageStatus::Published.as_str())),
    )
}

/// Sort order ascending, then title.
fn ordered(query: Select<Page>) -> Select<Page> {
    query
        .order_by_asc(page::Column::SortOrder)
        .order_by_asc(page::Column::Title)
}

fn validate_title(title: &str) -> Result<String, RepositoryError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(RepositoryError::validation("title", "Title is required"));
    }
    Ok(title.to_string())
}

fn validate_slug(slug: &str) -> Result<String, RepositoryError> {
    let slug = slug.trim();
    if slug.is_empty() {
        return Err(RepositoryError::validation("slug", "Slug is required"));
    }
    if !PAGE_SLUG.is_match(slug) {
        return Err(RepositoryError::validation(
            "slug",
            "Slug may contain only letters, digits, '-', '_', '.', '~' and '/'",
        ));
    }
    Ok(slug.to_string())
}

fn validate_template(template: &str) -> Result<String, RepositoryError> {
    let template = template.trim();
    if template.is_empty() {
        return Err(RepositoryError::validation(
            "template",
            "Template is required",
        ));
    }
    Ok(template.to_string())
}

fn validate_content(content: &Value) -> Result<(), RepositoryError> {
    if is_acceptable_document(content) {
        Ok(())
    } else {
        Err(RepositoryError::validation(
            "content",
            "Content must be a JSON object or an encoded JSON object",
        ))
    }
}

fn validate_seo(seo: Value) -> Result<Value, RepositoryError> {
    match seo {
        Value::Null => Ok(json!({})),
        Value::Object(map) => Ok(Value::Object(map)),
        _ => Err(RepositoryError::validation("seo", "SEO must be an object")),
    }
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}
