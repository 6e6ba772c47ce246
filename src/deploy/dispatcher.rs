//! External build dispatch.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::config::DeployConfig;

const DISPATCH_TIMEOUT: Duration = Duration::from_secs(15);

/// What the CI system needs to build one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub deployment_id: Uuid,
    /// `owner/repo`
    pub repository: String,
    pub domain: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("CI request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("CI rejected the dispatch with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Starts a remote build. The build reports back through the deploy callback.
#[async_trait]
pub trait BuildDispatcher: Send + Sync {
    async fn dispatch(&self, request: &BuildRequest) -> Result<(), DispatchError>;
}

/// Triggers a GitHub Actions `workflow_dispatch` event.
#[derive(Debug, Clone)]
pub struct GithubWorkflowDispatcher {
    client: reqwest::Client,
    api_base: String,
    token: String,
    workflow: String,
    git_ref: String,
}

impl GithubWorkflowDispatcher {
    /// `None` when no GitHub token is configured.
    pub fn from_config(config: &DeployConfig) -> Option<Self> {
        let token = config.github_token.as_deref().filter(|t| !t.is_empty())?;
        let client = reqwest::Client::builder()
            .timeout(DISPATCH_TIMEOUT)
            .build()
            .unwrap_or_default();

        Some(Self {
            client,
            api_base: config.github_api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            workflow: config.github_workflow.clone(),
            git_ref: config.github_ref.clone(),
        })
    }

    fn dispatch_url(&self, repository: &str) -> String {
        format!(
            "{}/repos/{}/actions/workflows/{}/dispatches",
            self.api_base, repository, self.workflow
        )
    }
}

#[async_trait]
impl BuildDispatcher for GithubWorkflowDispatcher {
    async fn dispatch(&self, request: &BuildRequest) -> Result<(), DispatchError> {
        let url = self.dispatch_url(&request.repository);
        tracing::debug!(%url, deployment_id = %request.deployment_id, "Dispatching workflow");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", concat!("cms/", env!("CARGO_PKG_VERSION")))
            .json(&json!({
                "ref": self.git_ref,
                "inputs": {
                    "reason": request.reason,
                    "deployment_id": request.deployment_id.to_string(),
                    "domain": request.domain,
                }
            }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DispatchError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
