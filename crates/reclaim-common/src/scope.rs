//! Cluster scope: an infrastructure object plus the ability to persist it

use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use tracing::debug;

use crate::infra::{InfraCluster, MetadataChange, ObjectStore};
use crate::Result;

/// Everything a GC pass or admin command needs to know about one cluster
///
/// Holds a snapshot of the infrastructure object's metadata as last read or
/// written, so [`ClusterScope::patch_object`] only sends what changed.
pub struct ClusterScope {
    cluster_name: String,
    namespace: String,
    infra: InfraCluster,
    snapshot: ObjectMeta,
    store: Arc<dyn ObjectStore>,
}

impl ClusterScope {
    /// Build a scope for CAPI cluster `cluster_name` and its infrastructure object
    pub fn new(
        cluster_name: impl Into<String>,
        infra: InfraCluster,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let snapshot = infra.object().metadata.clone();
        let namespace = snapshot.namespace.clone().unwrap_or_default();
        Self {
            cluster_name: cluster_name.into(),
            namespace,
            infra,
            snapshot,
            store,
        }
    }

    /// CAPI cluster name
    pub fn name(&self) -> &str {
        &self.cluster_name
    }

    /// Namespace of the cluster objects
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Cluster name used in the `kubernetes.io/cluster/<name>` ownership tag
    pub fn kubernetes_cluster_name(&self) -> String {
        self.infra.kubernetes_cluster_name(&self.cluster_name)
    }

    /// The infrastructure object
    pub fn infra_object(&self) -> &DynamicObject {
        self.infra.object()
    }

    /// Mutable infrastructure object; persist with [`ClusterScope::patch_object`]
    pub fn infra_object_mut(&mut self) -> &mut DynamicObject {
        self.infra.object_mut()
    }

    /// Persist metadata edits made since the last read or patch
    ///
    /// No request is sent when nothing changed. A concurrent writer makes the
    /// patch fail with a conflict; the caller is expected to retry from scratch.
    pub async fn patch_object(&mut self) -> Result<()> {
        let change = MetadataChange::between(&self.snapshot, &self.infra.object().metadata);
        if change.is_empty() {
            debug!(cluster = %self.cluster_name, "no metadata changes to patch");
            return Ok(());
        }

        let patched = self
            .store
            .patch_metadata(self.infra.reference(), &change)
            .await?;
        self.snapshot = patched.metadata.clone();
        self.infra.object_mut().metadata = patched.metadata;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{MockObjectStore, ObjectRef, AWS_CLUSTER_KIND};
    use crate::kube_utils::build_api_resource;
    use crate::{Error, MetadataGate, GC_ANNOTATION, GC_FINALIZER};

    const API_VERSION: &str = "infrastructure.cluster.x-k8s.io/v1beta2";

    fn scope(store: MockObjectStore) -> ClusterScope {
        let ar = build_api_resource(API_VERSION, AWS_CLUSTER_KIND);
        let mut obj = DynamicObject::new("cluster1", &ar).within("ns1");
        obj.metadata.resource_version = Some("10".to_string());
        let reference = ObjectRef {
            api_version: API_VERSION.to_string(),
            kind: AWS_CLUSTER_KIND.to_string(),
            name: "cluster1".to_string(),
            namespace: Some("ns1".to_string()),
        };
        let infra = InfraCluster::from_object(reference, obj).unwrap();
        ClusterScope::new("cluster1", infra, Arc::new(store))
    }

    #[tokio::test]
    async fn patch_without_changes_sends_nothing() {
        let mut store = MockObjectStore::new();
        store.expect_patch_metadata().never();

        let mut scope = scope(store);
        assert_eq!(scope.namespace(), "ns1");
        scope.patch_object().await.unwrap();
    }

    #[tokio::test]
    async fn patch_sends_diff_and_refreshes_snapshot() {
        let mut store = MockObjectStore::new();
        store
            .expect_patch_metadata()
            .times(1)
            .withf(|reference, change| {
                reference.name == "cluster1"
                    && change.resource_version.as_deref() == Some("10")
                    && change.finalizers == Some(vec![GC_FINALIZER.to_string()])
                    && change.annotations.get(GC_ANNOTATION) == Some(&Some("true".to_string()))
            })
            .returning(|_, change| {
                let ar = build_api_resource(API_VERSION, AWS_CLUSTER_KIND);
                let mut obj = DynamicObject::new("cluster1", &ar).within("ns1");
                obj.metadata.resource_version = Some("11".to_string());
                obj.metadata.finalizers = change.finalizers.clone();
                Ok(obj)
            });

        let mut scope = scope(store);
        scope.infra_object_mut().add_finalizer(GC_FINALIZER);
        scope.infra_object_mut().set_annotation(GC_ANNOTATION, "true");
        scope.patch_object().await.unwrap();

        assert_eq!(
            scope.infra_object().metadata.resource_version.as_deref(),
            Some("11")
        );
        // snapshot now matches, so a second patch is a no-op
        scope.patch_object().await.unwrap();
    }

    #[tokio::test]
    async fn patch_errors_are_returned_unchanged() {
        let mut store = MockObjectStore::new();
        store.expect_patch_metadata().returning(|_, _| {
            Err(Error::from(kube::Error::Api(kube::core::ErrorResponse {
                status: "Failure".to_string(),
                message: "the object has been modified".to_string(),
                reason: "Conflict".to_string(),
                code: 409,
            })))
        });

        let mut scope = scope(store);
        scope.infra_object_mut().add_finalizer(GC_FINALIZER);
        let err = scope.patch_object().await.unwrap_err();
        assert!(err.is_conflict());
    }
}
