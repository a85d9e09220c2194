//! Shared test utilities for reclaim
//!
//! This crate provides test helpers used across the workspace without
//! circular dependencies.
//!
//! ## Modules
//!
//! - [`fixtures`]: CAPI and CAPA objects as `DynamicObject`s
//! - [`store`]: an in-memory `ObjectStore`

pub mod fixtures;
pub mod store;

pub use fixtures::{aws_cluster, aws_managed_control_plane, capi_cluster};
pub use store::InMemoryObjectStore;
