//! Security group cleanup
//!
//! Groups tagged with the EKS cluster name belong to the managed control plane
//! and are removed by EKS when the cluster goes away.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use reclaim_common::{GcTask, Result};

use crate::aws::tags::EKS_CLUSTER_NAME_TAG;
use crate::aws::{Ec2Api, EC2_SERVICE};
use crate::cleanup::{CleanupFunc, DeleteOutcomes};
use crate::discovery::TaggedResource;

const SECURITY_GROUP_TYPE: &str = "security-group";
const SECURITY_GROUP_PREFIX: &str = "security-group/";

/// Deletes security groups created for Services
pub struct SecurityGroupCleanup {
    cluster: String,
    ec2: Arc<dyn Ec2Api>,
}

impl SecurityGroupCleanup {
    /// Cleanup for `cluster` using the given client
    pub fn new(cluster: &str, ec2: Arc<dyn Ec2Api>) -> Self {
        Self {
            cluster: cluster.to_string(),
            ec2,
        }
    }
}

#[async_trait]
impl CleanupFunc for SecurityGroupCleanup {
    fn task(&self) -> GcTask {
        GcTask::SecurityGroup
    }

    async fn cleanup(&self, resources: &[TaggedResource]) -> Result<()> {
        let mut outcomes = DeleteOutcomes::new(&self.cluster, EC2_SERVICE);

        for resource in resources {
            if !resource.arn.is(EC2_SERVICE, SECURITY_GROUP_TYPE) {
                trace!(arn = %resource.arn, "resource not a security group");
                continue;
            }
            if let Some(eks_cluster) = resource.tags.get(EKS_CLUSTER_NAME_TAG) {
                debug!(
                    arn = %resource.arn,
                    eks_cluster = %eks_cluster,
                    "security group created by EKS, skipping"
                );
                continue;
            }

            let resource_path = resource.arn.resource.as_str();
            let group_id = resource_path
                .strip_prefix(SECURITY_GROUP_PREFIX)
                .unwrap_or(resource_path);
            debug!(arn = %resource.arn, group_id, "deleting security group");
            outcomes.record(
                "security group",
                group_id,
                self.ec2.delete_security_group(group_id).await,
            );
        }

        debug!(cluster = %self.cluster, "finished processing security groups");
        outcomes.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::clients::MockEc2Api;
    use crate::aws::tags::tags_to_map;
    use crate::aws::AwsError;
    use mockall::predicate::*;

    const SG_ARN: &str = "arn:aws:ec2:eu-west-2:1234567890:security-group/sg-123456";

    fn resource(arn: &str, tags: &[(&str, &str)]) -> TaggedResource {
        TaggedResource::parse(arn, tags_to_map(tags.iter().copied())).unwrap()
    }

    fn cleanup(ec2: MockEc2Api) -> SecurityGroupCleanup {
        SecurityGroupCleanup::new("cluster1", Arc::new(ec2))
    }

    #[tokio::test]
    async fn service_security_group_is_deleted_by_id() {
        let mut ec2 = MockEc2Api::new();
        ec2.expect_delete_security_group()
            .with(eq("sg-123456"))
            .times(1)
            .returning(|_| Ok(()));

        cleanup(ec2)
            .cleanup(&[resource(
                SG_ARN,
                &[("kubernetes.io/cluster/cluster1", "owned")],
            )])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn eks_owned_security_group_is_skipped() {
        let mut ec2 = MockEc2Api::new();
        ec2.expect_delete_security_group().never();

        cleanup(ec2)
            .cleanup(&[resource(
                SG_ARN,
                &[
                    ("kubernetes.io/cluster/cluster1", "owned"),
                    (EKS_CLUSTER_NAME_TAG, "eks-cluster-1"),
                ],
            )])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn eks_tag_with_empty_value_still_skips() {
        let mut ec2 = MockEc2Api::new();
        ec2.expect_delete_security_group().never();

        cleanup(ec2)
            .cleanup(&[resource(
                SG_ARN,
                &[
                    ("kubernetes.io/cluster/cluster1", "owned"),
                    (EKS_CLUSTER_NAME_TAG, ""),
                ],
            )])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn other_resources_are_ignored() {
        let mut ec2 = MockEc2Api::new();
        ec2.expect_delete_security_group().never();

        cleanup(ec2)
            .cleanup(&[
                resource("arn:aws:s3:::somebucket", &[]),
                resource("arn:aws:ec2:eu-west-2:1234567890:instance/i-0abc", &[]),
            ])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dependency_violation_is_reported_after_all_attempts() {
        let mut ec2 = MockEc2Api::new();
        ec2.expect_delete_security_group()
            .with(eq("sg-1"))
            .times(1)
            .returning(|_| {
                Err(AwsError::DependencyViolation {
                    message: "resource sg-1 has a dependent object".to_string(),
                })
            });
        ec2.expect_delete_security_group()
            .with(eq("sg-2"))
            .times(1)
            .returning(|_| Ok(()));

        let err = cleanup(ec2)
            .cleanup(&[
                resource("arn:aws:ec2:eu-west-2:1:security-group/sg-1", &[]),
                resource("arn:aws:ec2:eu-west-2:1:security-group/sg-2", &[]),
            ])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("deleting security group sg-1"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn missing_security_group_is_success() {
        let mut ec2 = MockEc2Api::new();
        ec2.expect_delete_security_group().returning(|_| {
            Err(AwsError::NotFound {
                code: "InvalidGroup.NotFound".to_string(),
                message: "gone".to_string(),
            })
        });

        cleanup(ec2)
            .cleanup(&[resource(SG_ARN, &[])])
            .await
            .unwrap();
    }
}
