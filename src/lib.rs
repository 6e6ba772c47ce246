//! # CMS Library
//!
//! Core of the multi-tenant CMS backend: tenant registry, page tree, user
//! accounts, deployments, media and the public content API.

pub mod auth;
pub mod config;
pub mod content;
pub mod crypto;
pub mod db;
pub mod deploy;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod media;
pub mod models;
pub mod policy;
pub mod repositories;
pub mod seeds;
pub mod server;
pub mod slug;
pub mod telemetry;
pub use migration;
