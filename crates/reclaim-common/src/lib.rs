//! Common types for reclaim: errors, the GC metadata gate, and Kubernetes helpers

#![deny(missing_docs)]

pub mod error;
pub mod gate;
pub mod infra;
pub mod kube_utils;
pub mod scope;
pub mod task;
pub mod telemetry;

pub use error::Error;
pub use gate::{gc_enabled, gc_tasks, MetadataGate};
pub use infra::{
    resolve_infra_cluster, InfraCluster, KubeObjectStore, MetadataChange, ObjectRef, ObjectStore,
};
pub use scope::ClusterScope;
pub use task::GcTask;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Annotation that opts a cluster in (`"true"`) or out (`"false"`) of external resource GC.
///
/// Absence means enabled.
pub const GC_ANNOTATION: &str = "aws.cluster.x-k8s.io/external-resource-gc";

/// Annotation holding the comma separated list of GC tasks to run
pub const GC_TASKS_ANNOTATION: &str = "aws.cluster.x-k8s.io/external-resource-tasks-gc";

/// Finalizer blocking deletion of the infrastructure object until GC has run
pub const GC_FINALIZER: &str = "awsexternalresourcegc.infrastructure.cluster.x-k8s.io";

/// Label CAPI stamps on every object belonging to a cluster
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Field manager used for every patch issued by reclaim
pub const FIELD_MANAGER: &str = "reclaim";
