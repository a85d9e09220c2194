//! External resource garbage collection for CAPA clusters
//!
//! Load balancers and security groups created by the cloud controller manager
//! for `Service` objects are not owned by any Kubernetes object the provider
//! manages, so deleting a cluster would leak them. This crate finds them by
//! their cluster ownership tag and deletes them before the infrastructure
//! object's finalizer is released.

#![deny(missing_docs)]

pub mod aws;
pub mod cleanup;
pub mod discovery;
pub mod loadbalancer;
pub mod securitygroup;
pub mod service;

pub use cleanup::{default_cleanup_table, CleanupFunc, CleanupTable};
pub use discovery::{discover, DiscoveryTarget, GcStrategy, TaggedResource};
pub use loadbalancer::{LoadBalancerCleanup, TargetGroupCleanup};
pub use securitygroup::SecurityGroupCleanup;
pub use service::GcService;
