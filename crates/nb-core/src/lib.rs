//! nb-core: Core abstractions for the Nimbus fleet orchestrator
//!
//! This crate provides the shared domain types, environment-sourced
//! configuration, the TTL-backed node registry, and the reusable retry
//! policy used by the provider backends and the HTTP server.

pub mod config;
pub mod error;
pub mod registry;
pub mod retry;
pub mod types;

pub use error::ConfigError;
pub use registry::NodeRegistry;
pub use types::{NodeId, NodeRecord};
