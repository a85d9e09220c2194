//! Infrastructure object resolution
//!
//! A CAPI `Cluster` points at its infrastructure object through
//! `spec.infrastructureRef`. The referenced kind is only known at runtime, so
//! objects are fetched as [`DynamicObject`]s through the [`ObjectStore`]
//! collaborator and classified into an [`InfraCluster`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::kube_utils::build_api_resource;
use crate::{Error, Result, FIELD_MANAGER};

/// apiVersion of CAPI `Cluster` objects
pub const CAPI_CLUSTER_API_VERSION: &str = "cluster.x-k8s.io/v1beta1";
/// Kind of CAPI cluster objects
pub const CAPI_CLUSTER_KIND: &str = "Cluster";
/// apiVersion of `AWSCluster` objects
pub const AWS_CLUSTER_API_VERSION: &str = "infrastructure.cluster.x-k8s.io/v1beta2";
/// Kind of unmanaged (self-hosted control plane) infrastructure clusters
pub const AWS_CLUSTER_KIND: &str = "AWSCluster";
/// apiVersion of `AWSManagedControlPlane` objects
pub const AWS_MANAGED_CONTROL_PLANE_API_VERSION: &str = "controlplane.cluster.x-k8s.io/v1beta2";
/// Kind of EKS managed control planes
pub const AWS_MANAGED_CONTROL_PLANE_KIND: &str = "AWSManagedControlPlane";

/// Reference to a namespaced object by apiVersion, kind and name
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    /// apiVersion of the referenced object
    pub api_version: String,
    /// Kind of the referenced object
    pub kind: String,
    /// Name of the referenced object
    pub name: String,
    /// Namespace of the referenced object; defaults to the referrer's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ObjectRef {
    /// Reference to a CAPI `Cluster`
    pub fn capi_cluster(namespace: &str, name: &str) -> Self {
        Self {
            api_version: CAPI_CLUSTER_API_VERSION.to_string(),
            kind: CAPI_CLUSTER_KIND.to_string(),
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
        }
    }

    /// Namespace of the target, falling back to `default_ns`
    pub fn namespace_or<'a>(&'a self, default_ns: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default_ns)
    }
}

/// Metadata edits between two snapshots of the same object
///
/// Serializes to a JSON merge patch that carries the original
/// `resourceVersion`, so the API server rejects it with 409 Conflict if
/// someone else wrote the object in between.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataChange {
    /// resourceVersion the edits were made against
    pub resource_version: Option<String>,
    /// Annotations to set (`Some`) or remove (`None`)
    pub annotations: BTreeMap<String, Option<String>>,
    /// Replacement finalizer list, if it changed
    pub finalizers: Option<Vec<String>>,
}

impl MetadataChange {
    /// Compute the annotation and finalizer differences from `before` to `after`
    pub fn between(before: &ObjectMeta, after: &ObjectMeta) -> Self {
        let empty = BTreeMap::new();
        let old = before.annotations.as_ref().unwrap_or(&empty);
        let new = after.annotations.as_ref().unwrap_or(&empty);

        let mut annotations = BTreeMap::new();
        for (key, value) in new {
            if old.get(key) != Some(value) {
                annotations.insert(key.clone(), Some(value.clone()));
            }
        }
        for key in old.keys().filter(|k| !new.contains_key(*k)) {
            annotations.insert(key.clone(), None);
        }

        let old_finalizers = before.finalizers.clone().unwrap_or_default();
        let new_finalizers = after.finalizers.clone().unwrap_or_default();
        let finalizers = (old_finalizers != new_finalizers).then_some(new_finalizers);

        Self {
            resource_version: before.resource_version.clone(),
            annotations,
            finalizers,
        }
    }

    /// True when there is nothing to write
    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty() && self.finalizers.is_none()
    }

    /// Render as a JSON merge patch body
    pub fn to_merge_patch(&self) -> Value {
        let mut metadata = Map::new();
        if let Some(rv) = &self.resource_version {
            metadata.insert("resourceVersion".to_string(), json!(rv));
        }
        if !self.annotations.is_empty() {
            let annotations: Map<String, Value> = self
                .annotations
                .iter()
                .map(|(k, v)| (k.clone(), v.as_ref().map_or(Value::Null, |v| json!(v))))
                .collect();
            metadata.insert("annotations".to_string(), Value::Object(annotations));
        }
        if let Some(finalizers) = &self.finalizers {
            metadata.insert("finalizers".to_string(), json!(finalizers));
        }
        json!({ "metadata": metadata })
    }
}

/// Fetch-by-reference and metadata patch capability against the API server
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get an object, `None` if it does not exist
    async fn get(&self, reference: &ObjectRef) -> Result<Option<DynamicObject>>;

    /// Apply metadata edits to an object and return the stored result
    async fn patch_metadata(
        &self,
        reference: &ObjectRef,
        change: &MetadataChange,
    ) -> Result<DynamicObject>;
}

/// [`ObjectStore`] backed by a kube client
pub struct KubeObjectStore {
    client: Client,
}

impl KubeObjectStore {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, reference: &ObjectRef) -> Result<Api<DynamicObject>> {
        let namespace = reference.namespace.as_deref().ok_or_else(|| {
            Error::validation(format!(
                "{} {} reference has no namespace",
                reference.kind, reference.name
            ))
        })?;
        let ar = build_api_resource(&reference.api_version, &reference.kind);
        Ok(Api::namespaced_with(self.client.clone(), namespace, &ar))
    }
}

/// Params for a JSON merge patch owned by reclaim's field manager
fn merge_patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(FIELD_MANAGER.into()),
        ..Default::default()
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get(&self, reference: &ObjectRef) -> Result<Option<DynamicObject>> {
        Ok(self.api(reference)?.get_opt(&reference.name).await?)
    }

    async fn patch_metadata(
        &self,
        reference: &ObjectRef,
        change: &MetadataChange,
    ) -> Result<DynamicObject> {
        debug!(
            kind = %reference.kind,
            name = %reference.name,
            annotations = change.annotations.len(),
            finalizers = change.finalizers.is_some(),
            "patching object metadata"
        );
        let patched = self
            .api(reference)?
            .patch(
                &reference.name,
                &merge_patch_params(),
                &Patch::Merge(&change.to_merge_patch()),
            )
            .await?;
        Ok(patched)
    }
}

/// The infrastructure object of a CAPI cluster
#[derive(Clone, Debug)]
pub enum InfraCluster {
    /// `AWSCluster`: control plane runs on provider-managed instances
    Unmanaged {
        /// Reference used for patching
        reference: ObjectRef,
        /// Current object state
        object: DynamicObject,
    },
    /// `AWSManagedControlPlane`: EKS runs the control plane
    ManagedControlPlane {
        /// Reference used for patching
        reference: ObjectRef,
        /// Current object state
        object: DynamicObject,
    },
}

impl InfraCluster {
    /// Classify an object by the kind in its reference
    pub fn from_object(reference: ObjectRef, object: DynamicObject) -> Result<Self> {
        match reference.kind.as_str() {
            AWS_CLUSTER_KIND => Ok(Self::Unmanaged { reference, object }),
            AWS_MANAGED_CONTROL_PLANE_KIND => Ok(Self::ManagedControlPlane { reference, object }),
            other => Err(Error::validation(format!(
                "unsupported infrastructure kind {other} for {}",
                reference.name
            ))),
        }
    }

    /// The underlying object
    pub fn object(&self) -> &DynamicObject {
        match self {
            Self::Unmanaged { object, .. } | Self::ManagedControlPlane { object, .. } => object,
        }
    }

    /// Mutable access to the underlying object
    pub fn object_mut(&mut self) -> &mut DynamicObject {
        match self {
            Self::Unmanaged { object, .. } | Self::ManagedControlPlane { object, .. } => object,
        }
    }

    /// Reference to the underlying object
    pub fn reference(&self) -> &ObjectRef {
        match self {
            Self::Unmanaged { reference, .. } | Self::ManagedControlPlane { reference, .. } => {
                reference
            }
        }
    }

    /// Whether EKS manages the control plane
    pub fn is_managed(&self) -> bool {
        matches!(self, Self::ManagedControlPlane { .. })
    }

    /// Name the cloud controller manager uses in the cluster ownership tag
    ///
    /// For EKS this is `spec.eksClusterName`; otherwise the CAPI cluster name.
    pub fn kubernetes_cluster_name(&self, capi_cluster_name: &str) -> String {
        match self {
            Self::ManagedControlPlane { object, .. } => object
                .data
                .pointer("/spec/eksClusterName")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or(capi_cluster_name)
                .to_string(),
            Self::Unmanaged { .. } => capi_cluster_name.to_string(),
        }
    }

    /// `spec.region`, if set
    pub fn region(&self) -> Option<&str> {
        self.object()
            .data
            .pointer("/spec/region")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Follow a CAPI cluster's `spec.infrastructureRef` to its infrastructure object
///
/// Fails with [`Error::NotFound`] when either the cluster or the referenced
/// object is missing.
pub async fn resolve_infra_cluster(
    store: &dyn ObjectStore,
    namespace: &str,
    cluster_name: &str,
) -> Result<InfraCluster> {
    let cluster_ref = ObjectRef::capi_cluster(namespace, cluster_name);
    let cluster = store
        .get(&cluster_ref)
        .await?
        .ok_or_else(|| Error::not_found(CAPI_CLUSTER_KIND, namespace, cluster_name))?;

    let raw_ref = cluster
        .data
        .pointer("/spec/infrastructureRef")
        .cloned()
        .ok_or_else(|| {
            Error::validation_for_field(
                cluster_name,
                "spec.infrastructureRef",
                "cluster has no infrastructure reference",
            )
        })?;
    let mut infra_ref: ObjectRef = serde_json::from_value(raw_ref).map_err(|e| {
        Error::serialization_for_kind(
            CAPI_CLUSTER_KIND,
            format!("invalid spec.infrastructureRef on {}: {}", cluster.name_any(), e),
        )
    })?;
    if infra_ref.namespace.is_none() {
        infra_ref.namespace = Some(namespace.to_string());
    }

    let object = store.get(&infra_ref).await?.ok_or_else(|| {
        Error::not_found(
            infra_ref.kind.clone(),
            infra_ref.namespace_or(namespace),
            infra_ref.name.clone(),
        )
    })?;
    debug!(
        cluster = %cluster_name,
        kind = %infra_ref.kind,
        name = %infra_ref.name,
        "resolved infrastructure cluster"
    );
    InfraCluster::from_object(infra_ref, object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    fn cluster(infra_kind: &str) -> DynamicObject {
        let ar = build_api_resource(CAPI_CLUSTER_API_VERSION, CAPI_CLUSTER_KIND);
        let mut obj = DynamicObject::new("cluster1", &ar).within("default");
        obj.data = json!({
            "spec": {
                "infrastructureRef": {
                    "apiVersion": "infrastructure.cluster.x-k8s.io/v1beta2",
                    "kind": infra_kind,
                    "name": "cluster1-infra",
                }
            }
        });
        obj
    }

    fn infra(kind: &str, spec: Value) -> DynamicObject {
        let ar = build_api_resource("infrastructure.cluster.x-k8s.io/v1beta2", kind);
        let mut obj = DynamicObject::new("cluster1-infra", &ar).within("default");
        obj.data = json!({ "spec": spec });
        obj
    }

    fn meta(annotations: &[(&str, &str)], finalizers: &[&str], rv: &str) -> ObjectMeta {
        ObjectMeta {
            annotations: Some(
                annotations
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            finalizers: Some(finalizers.iter().map(|f| f.to_string()).collect()),
            resource_version: Some(rv.to_string()),
            ..Default::default()
        }
    }

    mod metadata_change {
        use super::*;

        #[test]
        fn identical_metadata_is_empty() {
            let m = meta(&[("a", "1")], &["f"], "7");
            let change = MetadataChange::between(&m, &m);
            assert!(change.is_empty());
            assert_eq!(change.resource_version.as_deref(), Some("7"));
        }

        #[test]
        fn set_and_removed_annotations_become_values_and_nulls() {
            let before = meta(&[("keep", "1"), ("drop", "x")], &[], "3");
            let after = meta(&[("keep", "1"), ("new", "true")], &[], "3");
            let change = MetadataChange::between(&before, &after);

            assert_eq!(change.annotations.len(), 2);
            assert_eq!(change.annotations["new"].as_deref(), Some("true"));
            assert_eq!(change.annotations["drop"], None);
            assert_eq!(change.finalizers, None);

            let patch = change.to_merge_patch();
            assert_eq!(patch["metadata"]["resourceVersion"], "3");
            assert_eq!(patch["metadata"]["annotations"]["new"], "true");
            assert!(patch["metadata"]["annotations"]["drop"].is_null());
            assert!(patch["metadata"].get("finalizers").is_none());
        }

        #[test]
        fn finalizer_changes_replace_the_whole_list() {
            let before = meta(&[], &["a"], "1");
            let after = meta(&[], &["a", "b"], "1");
            let change = MetadataChange::between(&before, &after);
            assert_eq!(change.finalizers, Some(vec!["a".to_string(), "b".to_string()]));
            assert_eq!(change.to_merge_patch()["metadata"]["finalizers"], json!(["a", "b"]));
        }

        #[test]
        fn merge_patches_name_the_field_manager_without_forcing() {
            let params = merge_patch_params();
            assert_eq!(params.field_manager.as_deref(), Some(FIELD_MANAGER));
            assert!(!params.force);
            assert!(!params.dry_run);
        }
    }

    mod infra_cluster {
        use super::*;

        fn reference(kind: &str) -> ObjectRef {
            ObjectRef {
                api_version: "infrastructure.cluster.x-k8s.io/v1beta2".to_string(),
                kind: kind.to_string(),
                name: "cluster1-infra".to_string(),
                namespace: Some("default".to_string()),
            }
        }

        #[test]
        fn unmanaged_cluster_uses_capi_name_for_tags() {
            let obj = infra(AWS_CLUSTER_KIND, json!({"region": "eu-west-2"}));
            let infra = InfraCluster::from_object(reference(AWS_CLUSTER_KIND), obj).unwrap();
            assert!(!infra.is_managed());
            assert_eq!(infra.kubernetes_cluster_name("cluster1"), "cluster1");
            assert_eq!(infra.region(), Some("eu-west-2"));
        }

        #[test]
        fn managed_control_plane_uses_eks_cluster_name() {
            let obj = infra(
                AWS_MANAGED_CONTROL_PLANE_KIND,
                json!({"eksClusterName": "eks-test-cluster"}),
            );
            let infra =
                InfraCluster::from_object(reference(AWS_MANAGED_CONTROL_PLANE_KIND), obj).unwrap();
            assert!(infra.is_managed());
            assert_eq!(infra.kubernetes_cluster_name("cluster1"), "eks-test-cluster");
            assert_eq!(infra.region(), None);
        }

        #[test]
        fn managed_control_plane_without_eks_name_falls_back() {
            let obj = infra(AWS_MANAGED_CONTROL_PLANE_KIND, json!({}));
            let infra =
                InfraCluster::from_object(reference(AWS_MANAGED_CONTROL_PLANE_KIND), obj).unwrap();
            assert_eq!(infra.kubernetes_cluster_name("cluster1"), "cluster1");
        }

        #[test]
        fn unsupported_kind_is_rejected() {
            let obj = infra("DockerCluster", json!({}));
            assert!(InfraCluster::from_object(reference("DockerCluster"), obj).is_err());
        }
    }

    mod resolve {
        use super::*;

        #[tokio::test]
        async fn missing_capi_cluster_is_not_found() {
            let mut store = MockObjectStore::new();
            store.expect_get().times(1).returning(|_| Ok(None));

            let err = resolve_infra_cluster(&store, "default", "cluster1")
                .await
                .unwrap_err();
            match err {
                Error::NotFound { kind, name, .. } => {
                    assert_eq!(kind, CAPI_CLUSTER_KIND);
                    assert_eq!(name, "cluster1");
                }
                other => panic!("expected NotFound, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn missing_infra_object_is_not_found() {
            let mut store = MockObjectStore::new();
            store
                .expect_get()
                .with(function(|r: &ObjectRef| r.kind == CAPI_CLUSTER_KIND))
                .returning(|_| Ok(Some(cluster(AWS_CLUSTER_KIND))));
            store
                .expect_get()
                .with(function(|r: &ObjectRef| r.kind == AWS_CLUSTER_KIND))
                .returning(|_| Ok(None));

            let err = resolve_infra_cluster(&store, "default", "cluster1")
                .await
                .unwrap_err();
            match err {
                Error::NotFound { kind, name, namespace } => {
                    assert_eq!(kind, AWS_CLUSTER_KIND);
                    assert_eq!(name, "cluster1-infra");
                    assert_eq!(namespace, "default");
                }
                other => panic!("expected NotFound, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn follows_reference_polymorphically() {
            for kind in [AWS_CLUSTER_KIND, AWS_MANAGED_CONTROL_PLANE_KIND] {
                let mut store = MockObjectStore::new();
                store
                    .expect_get()
                    .with(function(|r: &ObjectRef| r.kind == CAPI_CLUSTER_KIND))
                    .returning(move |_| Ok(Some(cluster(kind))));
                store
                    .expect_get()
                    .with(function(move |r: &ObjectRef| {
                        r.kind == kind && r.namespace.as_deref() == Some("default")
                    }))
                    .returning(move |_| Ok(Some(infra(kind, json!({})))));

                let infra = resolve_infra_cluster(&store, "default", "cluster1")
                    .await
                    .unwrap();
                assert_eq!(infra.reference().kind, kind);
                assert_eq!(infra.is_managed(), kind == AWS_MANAGED_CONTROL_PLANE_KIND);
            }
        }

        #[tokio::test]
        async fn cluster_without_infrastructure_ref_is_invalid() {
            let mut store = MockObjectStore::new();
            store.expect_get().returning(|_| {
                let ar = build_api_resource(CAPI_CLUSTER_API_VERSION, CAPI_CLUSTER_KIND);
                Ok(Some(DynamicObject::new("cluster1", &ar).within("default")))
            });

            let err = resolve_infra_cluster(&store, "default", "cluster1")
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Validation { .. }));
        }
    }
}
