//! CDN cache invalidation after a successful build.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use thiserror::Error;

use crate::config::CdnConfig;

#[derive(Debug, Error)]
pub enum InvalidationError {
    #[error("CDN request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("CDN rejected the invalidation with HTTP {status}")]
    Rejected { status: u16 },
}

/// Purges cached copies of a tenant's site.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    /// Returns `Ok(false)` when invalidation is not configured.
    async fn invalidate(&self, domain: &str) -> Result<bool, InvalidationError>;
}

/// Invalidator for deployments without a CDN.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInvalidator;

#[async_trait]
impl CacheInvalidator for NoopInvalidator {
    async fn invalidate(&self, domain: &str) -> Result<bool, InvalidationError> {
        tracing::info!(%domain, "No CDN configured, skipping cache invalidation");
        Ok(false)
    }
}

/// POSTs an invalidation batch to an HTTP purge endpoint.
#[derive(Debug, Clone)]
pub struct HttpPurgeInvalidator {
    client: reqwest::Client,
    purge_url: String,
    distribution_id: String,
    api_token: Option<String>,
}

impl HttpPurgeInvalidator {
    pub fn new(purge_url: &str, distribution_id: &str, api_token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            purge_url: purge_url.to_string(),
            distribution_id: distribution_id.to_string(),
            api_token,
        }
    }
}

#[async_trait]
impl CacheInvalidator for HttpPurgeInvalidator {
    async fn invalidate(&self, domain: &str) -> Result<bool, InvalidationError> {
        let mut request = self.client.post(&self.purge_url).json(&json!({
            "distributionId": self.distribution_id,
            "paths": [format!("/{domain}/*")],
            "callerReference": format!("{domain}-{}", Utc::now().timestamp_millis()),
        }));
        if let Some(token) = self.api_token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(InvalidationError::Rejected {
                status: response.status().as_u16(),
            });
        }

        tracing::info!(%domain, distribution_id = %self.distribution_id, "CDN invalidation requested");
        Ok(true)
    }
}

/// The invalidator described by `config`, or a no-op when incomplete.
pub fn invalidator_from_config(config: &CdnConfig) -> Arc<dyn CacheInvalidator> {
    match config.endpoint() {
        Some((distribution_id, purge_url)) => Arc::new(HttpPurgeInvalidator::new(
            purge_url,
            distribution_id,
            config.api_token.clone(),
        )),
        None => Arc::new(NoopInvalidator),
    }
}
