//! Load balancer and target group cleanup
//!
//! Only resources carrying the Service name tag are touched. Load balancers
//! created by the platform itself, such as the API server load balancer, do
//! not have it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use reclaim_common::{GcTask, Result};

use crate::aws::tags::SERVICE_NAME_TAG;
use crate::aws::{ElbApi, Elbv2Api, ELB_SERVICE};
use crate::cleanup::{CleanupFunc, DeleteOutcomes};
use crate::discovery::{TaggedResource, ELB_RESOURCE_PREFIX};

const LOAD_BALANCER_TYPE: &str = "loadbalancer";
const TARGET_GROUP_TYPE: &str = "targetgroup";

/// Whether `resource` is an ELB resource of `resource_type` created for a Service
fn is_elb_resource_to_delete(resource: &TaggedResource, resource_type: &str) -> bool {
    if !resource.arn.is(ELB_SERVICE, resource_type) {
        return false;
    }
    if resource.tag(SERVICE_NAME_TAG).is_none() {
        debug!(
            arn = %resource.arn,
            resource_type,
            "resource was not created for a Service, skipping"
        );
        return false;
    }
    true
}

/// Load balancer flavour, from the ARN resource path
#[derive(Debug, PartialEq, Eq)]
enum LoadBalancerKind<'a> {
    /// `loadbalancer/app/...`
    Application,
    /// `loadbalancer/net/...`
    Network,
    /// `loadbalancer/<name>`
    Classic { name: &'a str },
}

impl<'a> LoadBalancerKind<'a> {
    fn from_resource(resource: &'a str) -> Option<Self> {
        if resource.starts_with("loadbalancer/app/") {
            Some(Self::Application)
        } else if resource.starts_with("loadbalancer/net/") {
            Some(Self::Network)
        } else {
            resource
                .strip_prefix(ELB_RESOURCE_PREFIX)
                .filter(|name| !name.is_empty())
                .map(|name| Self::Classic { name })
        }
    }
}

/// Deletes classic, network and application load balancers
pub struct LoadBalancerCleanup {
    cluster: String,
    elb: Arc<dyn ElbApi>,
    elbv2: Arc<dyn Elbv2Api>,
}

impl LoadBalancerCleanup {
    /// Cleanup for `cluster` using the given clients
    pub fn new(cluster: &str, elb: Arc<dyn ElbApi>, elbv2: Arc<dyn Elbv2Api>) -> Self {
        Self {
            cluster: cluster.to_string(),
            elb,
            elbv2,
        }
    }
}

#[async_trait]
impl CleanupFunc for LoadBalancerCleanup {
    fn task(&self) -> GcTask {
        GcTask::LoadBalancer
    }

    async fn cleanup(&self, resources: &[TaggedResource]) -> Result<()> {
        let mut outcomes = DeleteOutcomes::new(&self.cluster, ELB_SERVICE);

        for resource in resources {
            if !is_elb_resource_to_delete(resource, LOAD_BALANCER_TYPE) {
                continue;
            }

            let arn = resource.arn.to_string();
            match LoadBalancerKind::from_resource(&resource.arn.resource) {
                Some(LoadBalancerKind::Application) => {
                    debug!(%arn, "deleting ALB for Service");
                    outcomes.record("ALB", &arn, self.elbv2.delete_load_balancer(&arn).await);
                }
                Some(LoadBalancerKind::Network) => {
                    debug!(%arn, "deleting NLB for Service");
                    outcomes.record("NLB", &arn, self.elbv2.delete_load_balancer(&arn).await);
                }
                Some(LoadBalancerKind::Classic { name }) => {
                    debug!(%arn, name, "deleting classic ELB for Service");
                    outcomes.record("classic ELB", name, self.elb.delete_load_balancer(name).await);
                }
                None => trace!(%arn, "unexpected elasticloadbalancing resource, ignoring"),
            }
        }

        debug!(cluster = %self.cluster, "finished processing load balancers");
        outcomes.into_result()
    }
}

/// Deletes target groups of v2 load balancers
pub struct TargetGroupCleanup {
    cluster: String,
    elbv2: Arc<dyn Elbv2Api>,
}

impl TargetGroupCleanup {
    /// Cleanup for `cluster` using the given client
    pub fn new(cluster: &str, elbv2: Arc<dyn Elbv2Api>) -> Self {
        Self {
            cluster: cluster.to_string(),
            elbv2,
        }
    }
}

#[async_trait]
impl CleanupFunc for TargetGroupCleanup {
    fn task(&self) -> GcTask {
        GcTask::TargetGroup
    }

    async fn cleanup(&self, resources: &[TaggedResource]) -> Result<()> {
        let mut outcomes = DeleteOutcomes::new(&self.cluster, ELB_SERVICE);

        for resource in resources {
            if !is_elb_resource_to_delete(resource, TARGET_GROUP_TYPE) {
                trace!(arn = %resource.arn, "resource not a target group for deletion");
                continue;
            }
            let arn = resource.arn.to_string();
            debug!(%arn, "deleting target group");
            outcomes.record(
                "target group",
                &arn,
                self.elbv2.delete_target_group(&arn).await,
            );
        }

        debug!(cluster = %self.cluster, "finished processing target groups");
        outcomes.into_result()
    }
}
