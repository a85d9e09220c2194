//! Object fixtures

use kube::api::DynamicObject;
use serde_json::json;

use reclaim_common::infra::{
    ObjectRef, AWS_CLUSTER_API_VERSION, AWS_CLUSTER_KIND, AWS_MANAGED_CONTROL_PLANE_API_VERSION,
    AWS_MANAGED_CONTROL_PLANE_KIND, CAPI_CLUSTER_API_VERSION, CAPI_CLUSTER_KIND,
};
use reclaim_common::kube_utils::build_api_resource;
use reclaim_common::CLUSTER_NAME_LABEL;

/// A CAPI `Cluster` whose infrastructureRef points at `infra`
pub fn capi_cluster(namespace: &str, name: &str, infra: &ObjectRef) -> DynamicObject {
    let ar = build_api_resource(CAPI_CLUSTER_API_VERSION, CAPI_CLUSTER_KIND);
    let mut obj = DynamicObject::new(name, &ar).within(namespace);
    obj.metadata.resource_version = Some("1".to_string());
    obj.data = json!({
        "spec": {
            "infrastructureRef": {
                "apiVersion": infra.api_version,
                "kind": infra.kind,
                "name": infra.name,
            }
        }
    });
    obj
}

/// An `AWSCluster` labelled as belonging to `cluster_name`
pub fn aws_cluster(namespace: &str, name: &str, cluster_name: &str) -> DynamicObject {
    let ar = build_api_resource(AWS_CLUSTER_API_VERSION, AWS_CLUSTER_KIND);
    let mut obj = DynamicObject::new(name, &ar).within(namespace);
    obj.metadata.resource_version = Some("1".to_string());
    obj.metadata.labels = Some(
        [(CLUSTER_NAME_LABEL.to_string(), cluster_name.to_string())]
            .into_iter()
            .collect(),
    );
    obj.data = json!({ "spec": { "region": "eu-west-2" } });
    obj
}

/// An `AWSManagedControlPlane` for EKS cluster `eks_cluster_name`
pub fn aws_managed_control_plane(
    namespace: &str,
    name: &str,
    cluster_name: &str,
    eks_cluster_name: &str,
) -> DynamicObject {
    let ar = build_api_resource(
        AWS_MANAGED_CONTROL_PLANE_API_VERSION,
        AWS_MANAGED_CONTROL_PLANE_KIND,
    );
    let mut obj = DynamicObject::new(name, &ar).within(namespace);
    obj.metadata.resource_version = Some("1".to_string());
    obj.metadata.labels = Some(
        [(CLUSTER_NAME_LABEL.to_string(), cluster_name.to_string())]
            .into_iter()
            .collect(),
    );
    obj.data = json!({
        "spec": {
            "region": "eu-west-2",
            "eksClusterName": eks_cluster_name,
        }
    });
    obj
}

/// Reference to an `AWSCluster` fixture
pub fn aws_cluster_ref(namespace: &str, name: &str) -> ObjectRef {
    ObjectRef {
        api_version: AWS_CLUSTER_API_VERSION.to_string(),
        kind: AWS_CLUSTER_KIND.to_string(),
        name: name.to_string(),
        namespace: Some(namespace.to_string()),
    }
}

/// Reference to an `AWSManagedControlPlane` fixture
pub fn aws_managed_control_plane_ref(namespace: &str, name: &str) -> ObjectRef {
    ObjectRef {
        api_version: AWS_MANAGED_CONTROL_PLANE_API_VERSION.to_string(),
        kind: AWS_MANAGED_CONTROL_PLANE_KIND.to_string(),
        name: name.to_string(),
        namespace: Some(namespace.to_string()),
    }
}
