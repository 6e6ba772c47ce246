//! # Deployment Repository
//!
//! Deployment records are append-only. After creation the only writes are
//! status transitions, each a conditional `UPDATE ... WHERE status IN (..)`
//! so that a record never moves backwards and a terminal record is never
//! rewritten.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::DeploymentStatus;
use crate::models::deployment::{self, ActiveModel as DeploymentActiveModel, Entity as Deployment};

/// Outcome fields recorded alongside a transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionDetails {
    pub build_log: Option<String>,
    /// Seconds
    pub duration: Option<i32>,
}

/// Owns its connection handle so background build tasks can hold one.
#[derive(Clone)]
pub struct DeploymentRepository {
    db: DatabaseConnection,
}

impl DeploymentRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Record a new deployment in PENDING.
    pub async fn create_pending(
        &self,
        tenant_id: Uuid,
        triggered_by: Option<Uuid>,
    ) -> Result<deployment::Model, RepositoryError> {
        let created = DeploymentActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            status: Set(DeploymentStatus::Pending.as_str().to_string()),
            triggered_by: Set(triggered_by),
            build_log: Set(None),
            duration: Set(None),
            started_at: Set(Utc::now().into()),
            finished_at: Set(None),
        }
        .insert(&self.db)
        .await?;

        Ok(created)
    }

    /// Move deployment `id` into `next` if its current status allows it.
    ///
    /// Returns `false`, without writing anything, when the record is missing
    /// or already past `next`. Entering a terminal state stamps `finished_at`.
    pub async fn transition(
        &self,
        id: Uuid,
        next: DeploymentStatus,
        details: TransitionDetails,
    ) -> Result<bool, RepositoryError> {
        let allowed: Vec<&'static str> = next
            .predecessors()
            .iter()
            .map(DeploymentStatus::as_str)
            .collect();
        if allowed.is_empty() {
            return Ok(false);
        }

        let mut update = Deployment::update_many()
            .col_expr(deployment::Column::Status, Expr::value(next.as_str()));

        if next.is_terminal() {
            update = update.col_expr(deployment::Column::FinishedAt, Expr::value(Utc::now()));
        }
        if let Some(build_log) = details.build_log {
            update = update.col_expr(deployment::Column::BuildLog, Expr::value(build_log));
        }
        if let Some(duration) = details.duration {
            update = update.col_expr(deployment::Column::Duration, Expr::value(duration));
        }

        let result = update
            .filter(deployment::Column::Id.eq(id))
            .filter(deployment::Column::Status.is_in(allowed))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<deployment::Model>, RepositoryError> {
        Ok(Deployment::find_by_id(id).one(&self.db).await?)
    }

    /// Deployments of a tenant, newest first.
    pub async fn list_for_tenant(
        &self,
        tenant_id: Uuid,
        limit: u64,
    ) -> Result<Vec<deployment::Model>, RepositoryError> {
        Ok(Deployment::find()
            .filter(deployment::Column::TenantId.eq(tenant_id))
            .order_by_desc(deployment::Column::StartedAt)
            .limit(limit)
            .all(&self.db)
            .await?)
    }
}
