//! # Data Models
//!
//! SeaORM entities for the CMS tables plus the small enums stored in their
//! text columns.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod deployment;
pub mod page;
pub mod tenant;
pub mod user;

pub use deployment::{DeploymentStatus, Entity as Deployment};
pub use page::{Entity as Page, PageStatus};
pub use tenant::Entity as Tenant;
pub use user::{Entity as User, Role};

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "cms".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Error returned when a stored or submitted enum value is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
