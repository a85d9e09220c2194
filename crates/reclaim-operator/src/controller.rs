//! Infrastructure cluster controller
//!
//! Watches `AWSCluster` and `AWSManagedControlPlane` objects as dynamic
//! objects and drives the GC entry points: `reconcile` while the object is
//! live, `reconcile_delete` once it is being deleted and still carries the GC
//! finalizer.

use std::sync::Arc;
use std::time::Duration;

use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument};

use reclaim_common::infra::{InfraCluster, ObjectRef, ObjectStore, CAPI_CLUSTER_KIND};
use reclaim_common::{ClusterScope, Error, MetadataGate, CLUSTER_NAME_LABEL, GC_FINALIZER};
use reclaim_gc::aws::ClientFactory;
use reclaim_gc::{GcService, GcStrategy};

/// Requeue interval after a successful reconcile
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(300);

/// Requeue interval after an error that retrying soon will not fix
pub const PERMANENT_ERROR_REQUEUE: Duration = Duration::from_secs(600);

/// API group prefix of CAPI core objects
const CAPI_GROUP_PREFIX: &str = "cluster.x-k8s.io/";

/// Shared context for one infrastructure kind's controller
pub struct Context {
    /// Object access for the scope
    pub store: Arc<dyn ObjectStore>,
    /// Builds AWS clients for the object's region
    pub aws: Arc<dyn ClientFactory>,
    /// The watched kind
    pub api_resource: ApiResource,
    /// Discovery strategy for cleanup passes
    pub strategy: GcStrategy,
    /// Requeue delay after a retryable error
    pub error_requeue: Duration,
}

impl Context {
    /// Create a context for the controller of `api_resource`
    pub fn new(
        store: Arc<dyn ObjectStore>,
        aws: Arc<dyn ClientFactory>,
        api_resource: ApiResource,
        strategy: GcStrategy,
        error_requeue: Duration,
    ) -> Self {
        Self {
            store,
            aws,
            api_resource,
            strategy,
            error_requeue,
        }
    }

    fn object_ref(&self, name: &str, namespace: &str) -> ObjectRef {
        ObjectRef {
            api_version: self.api_resource.api_version.clone(),
            kind: self.api_resource.kind.clone(),
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
        }
    }
}

/// Name of the CAPI cluster owning `obj`
///
/// Taken from the cluster name label, or from a `Cluster` owner reference
/// when the label is missing.
pub fn owner_cluster_name(obj: &DynamicObject) -> Option<String> {
    if let Some(name) = obj.labels().get(CLUSTER_NAME_LABEL).filter(|n| !n.is_empty()) {
        return Some(name.clone());
    }
    obj.owner_references()
        .iter()
        .find(|o| o.kind == CAPI_CLUSTER_KIND && o.api_version.starts_with(CAPI_GROUP_PREFIX))
        .map(|o| o.name.clone())
}

/// Reconcile one infrastructure object
#[instrument(skip(obj, ctx), fields(kind = %ctx.api_resource.kind, name = %obj.name_any()))]
pub async fn reconcile(obj: Arc<DynamicObject>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = obj.name_any();
    let namespace = obj.namespace().ok_or_else(|| {
        Error::validation(format!("{} {} has no namespace", ctx.api_resource.kind, name))
    })?;

    let Some(cluster_name) = owner_cluster_name(&obj) else {
        info!("no owning Cluster yet, waiting");
        return Ok(Action::requeue(ctx.error_requeue));
    };

    let deleting = obj.metadata.deletion_timestamp.is_some();
    if deleting && !obj.contains_finalizer(GC_FINALIZER) {
        debug!("being deleted without the gc finalizer, nothing to do");
        return Ok(Action::await_change());
    }

    let infra = InfraCluster::from_object(ctx.object_ref(&name, &namespace), (*obj).clone())?;
    let region = infra.region().map(str::to_string).ok_or_else(|| {
        Error::validation_for_field(
            cluster_name.clone(),
            "spec.region",
            "infrastructure object has no region",
        )
    })?;

    let clients = ctx.aws.clients_for_region(&region);
    let scope = ClusterScope::new(cluster_name, infra, ctx.store.clone());
    let mut gc = GcService::new(scope, clients, region).with_strategy(ctx.strategy);

    if deleting {
        gc.reconcile_delete().await?;
        info!("external resources cleaned up, gc finalizer released");
        return Ok(Action::await_change());
    }

    gc.reconcile().await?;
    Ok(Action::requeue(RECONCILE_INTERVAL))
}

/// Error policy for the controller
///
/// Errors that a retry cannot fix, such as an invalid annotation, back off to
/// [`PERMANENT_ERROR_REQUEUE`].
pub fn error_policy(obj: Arc<DynamicObject>, error: &Error, ctx: Arc<Context>) -> Action {
    let retryable = error.is_retryable();
    error!(
        ?error,
        kind = %ctx.api_resource.kind,
        name = %obj.name_any(),
        retryable,
        "reconciliation failed"
    );

    if retryable {
        Action::requeue(ctx.error_requeue)
    } else {
        Action::requeue(PERMANENT_ERROR_REQUEUE)
    }
}
