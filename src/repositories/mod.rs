//! # Repository Layer
//!
//! Repositories encapsulate the SeaORM operations for each entity and
//! enforce the cross-record invariants that storage constraints alone do not
//! express.

pub mod deployment;
pub mod page;
pub mod tenant;
pub mod user;

pub use deployment::{DeploymentRepository, TransitionDetails};
pub use page::{NewPage, PageRepository, PageUpdate};
pub use tenant::{NewTenant, TenantRepository, TenantUpdate, TenantWithCounts};
pub use user::{NewUser, UserRepository, UserUpdate};
