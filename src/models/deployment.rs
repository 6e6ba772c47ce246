//! Deployment entity model
//!
//! Audit and state record for one build attempt of a tenant's static site.

use std::fmt;
use std::str::FromStr;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::UnknownVariant;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "deployments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    /// One of the [`DeploymentStatus`] values
    pub status: String,

    pub triggered_by: Option<Uuid>,

    #[sea_orm(column_type = "Text", nullable)]
    pub build_log: Option<String>,

    /// Build duration in seconds
    pub duration: Option<i32>,

    pub started_at: DateTimeWithTimeZone,

    /// Set only on the terminal transition
    pub finished_at: Option<DateTimeWithTimeZone>,
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
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn status(&self) -> DeploymentStatus {
        self.status.parse().unwrap_or(DeploymentStatus::Failed)
    }
}

/// Lifecycle state of a deployment.
///
/// `Pending -> Building -> {Success | Failed}`; the last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    Pending,
    Building,
    Success,
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "PENDING",
            DeploymentStatus::Building => "BUILDING",
            DeploymentStatus::Success => "SUCCESS",
            DeploymentStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Success | DeploymentStatus::Failed)
    }

    /// States a deployment may be in immediately before entering `self`.
    pub fn predecessors(&self) -> &'static [DeploymentStatus] {
        match self {
            DeploymentStatus::Pending => &[],
            DeploymentStatus::Building => &[DeploymentStatus::Pending],
            DeploymentStatus::Success | DeploymentStatus::Failed => {
                &[DeploymentStatus::Pending, DeploymentStatus::Building]
            }
        }
    }

    pub fn can_transition_to(&self, next: DeploymentStatus) -> bool {
        next.predecessors().contains(self)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PENDING" => Ok(DeploymentStatus::Pending),
            "BUILDING" => Ok(DeploymentStatus::Building),
            "SUCCESS" => Ok(DeploymentStatus::Success),
            "FAILED" => Ok(DeploymentStatus::Failed),
            other => Err(UnknownVariant {
                kind: "deployment status",
                value: other.to_string(),
            }),
        }
    }
}
