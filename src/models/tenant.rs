//! Tenant entity model
//!
//! A tenant is one client site: it owns pages, users and deployments and is
//! addressed publicly through its API key.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub name: String,

    /// URL-safe identifier, unique across tenants
    #[sea_orm(unique)]
    pub slug: String,

    /// Primary domain, unique across tenants
    #[sea_orm(unique)]
    pub domain: String,

    /// Alternate domains as a JSON array of strings
    #[sea_orm(column_type = "JsonBinary")]
    pub domains: Json,

    #[sea_orm(unique)]
    pub api_key: String,

    /// Display settings bag (logo, primaryColor, description, ...)
    #[sea_orm(column_type = "JsonBinary")]
    pub settings: Json,

    pub is_active: bool,

    /// `owner/repo` of the CI repository that builds this site
    pub build_repository: Option<String>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::page::Entity")]
    Pages,
    #[sea_orm(has_many = "super::user::Entity")]
    Users,
    #[sea_orm(has_many = "super::deployment::Entity")]
    Deployments,
}

impl Related<super::page::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Pages.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::deployment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Deployments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Alternate domains decoded from the JSON column; malformed entries are skipped.
    pub fn alias_domains(&self) -> Vec<String> {
        self.domains
            .as_array()
            .map(|values| {
                values
                    .iter()
                    .filter_map(|value| value.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}
