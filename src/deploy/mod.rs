//! # Deployment State Machine
//!
//! A deployment starts PENDING, moves to BUILDING when its build is started
//! and ends SUCCESS or FAILED, either when the CI system calls back or when a
//! simulated build finishes. Builds run on detached tasks; the caller that
//! triggered one only ever waits for the PENDING record to be written.
//!
//! Every transition goes through [`DeploymentRepository::transition`], which
//! only writes when the current status permits the move. Side effects of a
//! successful build (public cache eviction, CDN purge) run only for the
//! caller whose transition actually applied.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::counter;
use sea_orm::DatabaseConnection;
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::instrument;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::crypto::secrets_match;
use crate::error::{ApiError, RepositoryError, unauthorized};
use crate::gateway::cache::PublicCache;
use crate::models::{DeploymentStatus, deployment, tenant};
use crate::repositories::{DeploymentRepository, TenantRepository, TransitionDetails};

pub mod cdn;
pub mod dispatcher;

pub use cdn::{CacheInvalidator, HttpPurgeInvalidator, NoopInvalidator, invalidator_from_config};
pub use dispatcher::{BuildDispatcher, BuildRequest, DispatchError, GithubWorkflowDispatcher};

/// Build log recorded for simulated builds.
pub const SIMULATED_BUILD_LOG: &str = "Simulated build (no CI configured)";

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Invalid webhook secret")]
    InvalidSecret,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<DeployError> for ApiError {
    fn from(error: DeployError) -> Self {
        match error {
            DeployError::InvalidSecret => unauthorized(Some("Invalid webhook secret")),
            DeployError::Repository(error) => error.into(),
        }
    }
}

/// Result of a build callback.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    /// The deployment moved into the reported state
    Applied(deployment::Model),
    /// The deployment was already terminal; nothing changed
    AlreadyTerminal(DeploymentStatus),
}

/// Collaborators and settings of the deployment pipeline.
pub struct DeploymentSettings {
    pub dispatcher: Option<Arc<dyn BuildDispatcher>>,
    pub invalidator: Arc<dyn CacheInvalidator>,
    pub callback_secret: Option<String>,
    pub simulated_build_delay: Duration,
}

impl DeploymentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let dispatcher = GithubWorkflowDispatcher::from_config(&config.deploy)
            .map(|github| Arc::new(github) as Arc<dyn BuildDispatcher>);

        Self {
            dispatcher,
            invalidator: invalidator_from_config(&config.cdn),
            callback_secret: config
                .deploy_callback_secret
                .clone()
                .filter(|secret| !secret.is_empty()),
            simulated_build_delay: Duration::from_millis(config.deploy.simulated_build_delay_ms),
        }
    }
}

/// Triggers builds and resolves them.
#[derive(Clone)]
pub struct DeploymentService {
    inner: Arc<Inner>,
}

struct Inner {
    db: DatabaseConnection,
    deployments: DeploymentRepository,
    settings: DeploymentSettings,
    public_cache: PublicCache,
    tasks: TaskTracker,
}

impl DeploymentService {
    pub fn new(db: DatabaseConnection, settings: DeploymentSettings, public_cache: PublicCache) -> Self {
        Self {
            inner: Arc::new(Inner {
                deployments: DeploymentRepository::new(db.clone()),
                db,
                settings,
                public_cache,
                tasks: TaskTracker::new(),
            }),
        }
    }

    pub fn deployments(&self) -> &DeploymentRepository {
        &self.inner.deployments
    }

    /// Record a PENDING deployment for `tenant_id` and start its build in
    /// the background. Returns as soon as the record exists.
    pub async fn trigger(
        &self,
        tenant_id: Uuid,
        triggered_by: Option<(Uuid, &str)>,
    ) -> Result<deployment::Model, RepositoryError> {
        let tenant = TenantRepository::new(&self.inner.db).get(tenant_id).await?;
        let deployment = self
            .inner
            .deployments
            .create_pending(tenant.id, triggered_by.map(|(id, _)| id))
            .await?;

        counter!("cms_deployments_triggered_total").increment(1);
        tracing::info!(
            deployment_id = %deployment.id,
            tenant_id = %tenant.id,
            triggered_by = ?triggered_by.map(|(id, _)| id),
            "Deployment triggered"
        );

        let reason = format!(
            "Deploy triggered by {} for {}",
            triggered_by.map(|(_, email)| email).unwrap_or("CMS"),
            tenant.domain
        );
        let service = self.clone();
        let deployment_id = deployment.id;
        self.inner
            .tasks
            .spawn(async move { service.run_build(tenant, deployment_id, reason).await });

        Ok(deployment)
    }

    #[instrument(skip(self, tenant, reason), fields(tenant_id = %tenant.id))]
    async fn run_build(&self, tenant: tenant::Model, deployment_id: Uuid, reason: String) {
        let started = Instant::now();

        match self.start_building(deployment_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!("Deployment resolved before its build started");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to mark deployment as building");
                return;
            }
        }

        let target = self
            .inner
            .settings
            .dispatcher
            .as_ref()
            .zip(tenant.build_repository.clone());

        let outcome = match target {
            Some((dispatcher, repository)) => {
                let request = BuildRequest {
                    deployment_id,
                    repository,
                    domain: tenant.domain.clone(),
                    reason,
                };
                match dispatcher.dispatch(&request).await {
                    Ok(()) => {
                        tracing::info!(repository = %request.repository, "Build dispatched");
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Build dispatch failed");
                        (
                            DeploymentStatus::Failed,
                            TransitionDetails {
                                build_log: Some(format!("Build dispatch failed: {e}")),
                                duration: None,
                            },
                        )
                    }
                }
            }
            None => {
                tokio::time::sleep(self.inner.settings.simulated_build_delay).await;
                (
                    DeploymentStatus::Success,
                    TransitionDetails {
                        build_log: Some(SIMULATED_BUILD_LOG.to_string()),
                        duration: Some(i32::try_from(started.elapsed().as_secs()).unwrap_or(i32::MAX)),
                    },
                )
            }
        };

        let (status, details) = outcome;
        if let Err(e) = self.complete(deployment_id, status, details).await {
            tracing::error!(error = %e, "Failed to record build outcome");
        }
    }

    async fn start_building(&self, deployment_id: Uuid) -> Result<bool, RepositoryError> {
        let moved = self
            .inner
            .deployments
            .transition(
                deployment_id,
                DeploymentStatus::Building,
                TransitionDetails::default(),
            )
            .await?;
        if moved {
            tracing::info!(%deployment_id, "Deployment building");
        }
        Ok(moved)
    }

    /// Move a deployment into a terminal state and run the success side
    /// effects. `None` when the transition did not apply.
    pub async fn complete(
        &self,
        deployment_id: Uuid,
        status: DeploymentStatus,
        details: TransitionDetails,
    ) -> Result<Option<deployment::Model>, RepositoryError> {
        if !status.is_terminal() {
            return Err(RepositoryError::validation(
                "status",
                "status must be SUCCESS or FAILED",
            ));
        }

        let applied = self
            .inner
            .deployments
            .transition(deployment_id, status, details)
            .await?;
        if !applied {
            return Ok(None);
        }

        counter!("cms_deployments_finished_total", "status" => status.as_str()).increment(1);

        let deployment = self
            .inner
            .deployments
            .find_by_id(deployment_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Deployment"))?;

        tracing::info!(
            %deployment_id,
            tenant_id = %deployment.tenant_id,
            status = %status,
            duration = ?deployment.duration,
            "Deployment finished"
        );

        if status == DeploymentStatus::Success {
            self.after_success(deployment.tenant_id).await;
        }

        Ok(Some(deployment))
    }

    /// Evict the public cache and purge the CDN. Failures are logged only.
    async fn after_success(&self, tenant_id: Uuid) {
        self.inner.public_cache.invalidate_tenant(tenant_id).await;

        let tenant = match TenantRepository::new(&self.inner.db).find_by_id(tenant_id).await {
            Ok(Some(tenant)) => tenant,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(%tenant_id, error = %e, "Could not load tenant for CDN invalidation");
                return;
            }
        };

        if let Err(e) = self.inner.settings.invalidator.invalidate(&tenant.domain).await {
            counter!("cms_cdn_invalidation_failures_total").increment(1);
            tracing::warn!(%tenant_id, domain = %tenant.domain, error = %e, "CDN invalidation failed");
        }
    }

    /// Whether `presented` matches the configured callback secret. With no
    /// secret configured nothing matches.
    pub fn verify_callback_secret(&self, presented: Option<&str>) -> bool {
        match (self.inner.settings.callback_secret.as_deref(), presented) {
            (Some(expected), Some(presented)) => secrets_match(presented, expected),
            (None, _) => {
                tracing::warn!("Deploy callback rejected: no callback secret configured");
                false
            }
            _ => false,
        }
    }

    /// Apply a build outcome reported by the CI system.
    pub async fn handle_callback(
        &self,
        presented_secret: Option<&str>,
        deployment_id: Uuid,
        status: DeploymentStatus,
        details: TransitionDetails,
    ) -> Result<CallbackOutcome, DeployError> {
        if !self.verify_callback_secret(presented_secret) {
            tracing::warn!(%deployment_id, "Deploy callback with invalid secret");
            return Err(DeployError::InvalidSecret);
        }

        let existing = self
            .inner
            .deployments
            .find_by_id(deployment_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Deployment"))?;

        if existing.status().is_terminal() {
            tracing::info!(
                %deployment_id,
                status = %existing.status,
                "Ignoring callback for finished deployment"
            );
            return Ok(CallbackOutcome::AlreadyTerminal(existing.status()));
        }

        match self.complete(deployment_id, status, details).await? {
            Some(updated) => Ok(CallbackOutcome::Applied(updated)),
            None => {
                let current = self
                    .inner
                    .deployments
                    .find_by_id(deployment_id)
                    .await?
                    .map(|deployment| deployment.status())
                    .unwrap_or(status);
                Ok(CallbackOutcome::AlreadyTerminal(current))
            }
        }
    }

    /// Stop accepting builds and wait up to `timeout` for running ones.
    /// Returns `false` if some were still running.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.inner.tasks.close();
        tokio::time::timeout(timeout, self.inner.tasks.wait())
            .await
            .is_ok()
    }

    /// Wait for every build started so far, without closing the tracker.
    pub async fn wait_for_background_tasks(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
    }
}
