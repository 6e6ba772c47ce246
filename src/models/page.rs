//! Page entity model
//!
//! Pages belong to exactly one tenant and may reference a parent page of the
//! same tenant. The `content` column holds the template-dependent document
//! described in [`crate::content`].

use std::fmt;
use std::str::FromStr;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::UnknownVariant;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "pages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    /// Unique within the tenant, compared case-sensitively
    pub slug: String,

    pub title: String,
    pub description: Option<String>,

    #[sea_orm(column_type = "JsonBinary")]
    pub content: Json,

    #[sea_orm(column_type = "JsonBinary")]
    pub seo: Json,

    /// One of the [`PageStatus`] values
    pub status: String,

    /// Free-form template tag ("default", "home", "news", ...)
    pub template: String,

    pub sort_order: i32,
    pub parent_id: Option<Uuid>,
    pub author_id: Option<Uuid>,

    /// Stamped on the transition into PUBLISHED, never cleared afterwards
    pub published_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id",
        on_delete = "Cascade"
    )]
    Tenant,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::AuthorId",
        to = "super::user::Column::Id",
        on_delete = "SetNull"
    )]
    Author,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Author.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn status(&self) -> PageStatus {
        self.status.parse().unwrap_or(PageStatus::Draft)
    }

    pub fn is_published(&self) -> bool {
        self.status() == PageStatus::Published
    }
}

/// Editorial status of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageStatus {
    Draft,
    Published,
    Archived,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::Draft => "DRAFT",
            PageStatus::Published => "PUBLISHED",
            PageStatus::Archived => "ARCHIVED",
        }
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "DRAFT" => Ok(PageStatus::Draft),
            "PUBLISHED" => Ok(PageStatus::Published),
            "ARCHIVED" => Ok(PageStatus::Archived),
            other => Err(UnknownVariant {
                kind: "page status",
                value: other.to_string(),
            }),
        }
    }
}
