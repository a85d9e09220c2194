//! Tag keys and helpers
//!
//! The cloud controller manager stamps everything it creates for a Service
//! with the cluster ownership tag and the originating Service name.

use std::collections::BTreeMap;

/// Prefix of the cluster ownership tag key
pub const CLUSTER_TAG_PREFIX: &str = "kubernetes.io/cluster/";

/// Value of the ownership tag on resources the cluster owns outright
pub const OWNED: &str = "owned";

/// `namespace/name` of the Service a resource was created for
pub const SERVICE_NAME_TAG: &str = "kubernetes.io/service-name";

/// Set by EKS on resources it creates for the managed control plane
pub const EKS_CLUSTER_NAME_TAG: &str = "aws:eks:cluster-name";

/// Maximum names or ARNs per ELB describe-tags request
pub const DESCRIBE_TAGS_CHUNK_SIZE: usize = 20;

/// Ownership tag key for a cluster: `kubernetes.io/cluster/<name>`
pub fn cluster_tag_key(cluster_name: &str) -> String {
    format!("{CLUSTER_TAG_PREFIX}{cluster_name}")
}

/// Whether `tags` mark the resource as owned by `cluster_name`
pub fn is_owned_by(tags: &BTreeMap<String, String>, cluster_name: &str) -> bool {
    tags.get(&cluster_tag_key(cluster_name))
        .is_some_and(|v| v == OWNED)
}

/// Build a tag map from key/value pairs
pub fn tags_to_map<K, V, I>(tags: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    tags.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Split names into batches accepted by describe-tags
pub fn chunk_resources(names: &[String]) -> Vec<Vec<String>> {
    names
        .chunks(DESCRIBE_TAGS_CHUNK_SIZE)
        .map(<[String]>::to_vec)
        .collect()
}
