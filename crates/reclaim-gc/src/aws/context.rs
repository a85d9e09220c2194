//! Shared AWS configuration context
//!
//! Loads the SDK configuration (credentials chain, retry settings) once and
//! hands out per-region client sets for each reconciliation.

use std::sync::Arc;

use aws_config::{BehaviorVersion, Region, SdkConfig};

use super::clients::{
    Ec2Api, ElbApi, Elbv2Api, SdkEc2Client, SdkElbClient, SdkElbv2Client, SdkTaggingClient,
    TaggingApi,
};

/// The service clients one GC pass talks to
#[derive(Clone)]
pub struct AwsClients {
    /// Resource Groups Tagging API
    pub tagging: Arc<dyn TaggingApi>,
    /// Classic ELB
    pub elb: Arc<dyn ElbApi>,
    /// ELBv2
    pub elbv2: Arc<dyn Elbv2Api>,
    /// EC2
    pub ec2: Arc<dyn Ec2Api>,
}

impl std::fmt::Debug for AwsClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsClients").finish_non_exhaustive()
    }
}

/// Builds client sets for a region
pub trait ClientFactory: Send + Sync {
    /// Clients bound to `region`
    fn clients_for_region(&self, region: &str) -> AwsClients;
}

/// Shared AWS configuration context for creating service clients
///
/// # Example
/// ```ignore
/// let aws = AwsContext::load().await;
/// let clients = aws.clients_for_region("eu-west-2");
/// ```
#[derive(Clone)]
pub struct AwsContext {
    config: Arc<SdkConfig>,
}

impl AwsContext {
    /// Load AWS configuration from the environment, config files and IAM roles
    pub async fn load() -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self {
            config: Arc::new(config),
        }
    }

    fn regional_config(&self, region: &str) -> SdkConfig {
        self.config
            .to_builder()
            .region(Region::new(region.to_string()))
            .build()
    }
}

impl ClientFactory for AwsContext {
    fn clients_for_region(&self, region: &str) -> AwsClients {
        let config = self.regional_config(region);
        AwsClients {
            tagging: Arc::new(SdkTaggingClient::new(
                aws_sdk_resourcegroupstagging::Client::new(&config),
            )),
            elb: Arc::new(SdkElbClient::new(aws_sdk_elasticloadbalancing::Client::new(
                &config,
            ))),
            elbv2: Arc::new(SdkElbv2Client::new(
                aws_sdk_elasticloadbalancingv2::Client::new(&config),
            )),
            ec2: Arc::new(SdkEc2Client::new(aws_sdk_ec2::Client::new(&config))),
        }
    }
}

impl std::fmt::Debug for AwsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsContext")
            .field("region", &self.config.region())
            .finish_non_exhaustive()
    }
}
