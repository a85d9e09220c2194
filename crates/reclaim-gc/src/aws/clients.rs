//! AWS service seams
//!
//! Each trait covers the calls GC makes against one service, in terms of
//! plain Rust types. The `Sdk*` structs implement them with the AWS SDK; tests
//! substitute mocks.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::trace;

#[cfg(test)]
use mockall::automock;

use super::error::{classify_sdk_error, AwsError};

/// A resource identifier (ARN or name) and its tags
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceTags {
    /// ARN, or name for classic load balancers
    pub id: String,
    /// Tag key to value
    pub tags: BTreeMap<String, String>,
}

/// One page of a paginated listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Token for the next page, `None` on the last page
    pub next_token: Option<String>,
}

/// Resource Groups Tagging API
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TaggingApi: Send + Sync {
    /// One page of resources tagged `tag_key=tag_value`
    async fn get_resources(
        &self,
        tag_key: &str,
        tag_value: &str,
        pagination_token: Option<String>,
    ) -> Result<Page<ResourceTags>, AwsError>;
}

/// Classic Elastic Load Balancing
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ElbApi: Send + Sync {
    /// Delete a classic load balancer by name
    async fn delete_load_balancer(&self, name: &str) -> Result<(), AwsError>;

    /// One page of classic load balancer names
    async fn describe_load_balancers(
        &self,
        marker: Option<String>,
    ) -> Result<Page<String>, AwsError>;

    /// Tags of up to 20 classic load balancers, keyed by name
    async fn describe_tags(&self, names: &[String]) -> Result<Vec<ResourceTags>, AwsError>;
}

/// Elastic Load Balancing v2 (application and network load balancers)
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Elbv2Api: Send + Sync {
    /// Delete an application or network load balancer by ARN
    async fn delete_load_balancer(&self, arn: &str) -> Result<(), AwsError>;

    /// Delete a target group by ARN
    async fn delete_target_group(&self, arn: &str) -> Result<(), AwsError>;

    /// One page of v2 load balancer ARNs
    async fn describe_load_balancers(
        &self,
        marker: Option<String>,
    ) -> Result<Page<String>, AwsError>;

    /// One page of target group ARNs
    async fn describe_target_groups(
        &self,
        marker: Option<String>,
    ) -> Result<Page<String>, AwsError>;

    /// Tags of up to 20 load balancers or target groups, keyed by ARN
    async fn describe_tags(&self, arns: &[String]) -> Result<Vec<ResourceTags>, AwsError>;
}

/// EC2
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Ec2Api: Send + Sync {
    /// Delete a security group by id
    async fn delete_security_group(&self, group_id: &str) -> Result<(), AwsError>;
}

/// [`TaggingApi`] over the Resource Groups Tagging API SDK client
pub struct SdkTaggingClient {
    client: aws_sdk_resourcegroupstagging::Client,
}

impl SdkTaggingClient {
    /// Wrap an SDK client
    pub fn new(client: aws_sdk_resourcegroupstagging::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TaggingApi for SdkTaggingClient {
    async fn get_resources(
        &self,
        tag_key: &str,
        tag_value: &str,
        pagination_token: Option<String>,
    ) -> Result<Page<ResourceTags>, AwsError> {
        use aws_sdk_resourcegroupstagging::types::TagFilter;

        let output = self
            .client
            .get_resources()
            .tag_filters(TagFilter::builder().key(tag_key).values(tag_value).build())
            .set_pagination_token(pagination_token)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        let items = output
            .resource_tag_mapping_list()
            .iter()
            .filter_map(|mapping| {
                let arn = mapping.resource_arn()?;
                let tags = mapping
                    .tags()
                    .iter()
                    .map(|t| (t.key().to_string(), t.value().to_string()))
                    .collect();
                Some(ResourceTags {
                    id: arn.to_string(),
                    tags,
                })
            })
            .collect::<Vec<_>>();
        trace!(count = items.len(), "tag search page");

        Ok(Page {
            items,
            next_token: output
                .pagination_token()
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        })
    }
}

/// [`ElbApi`] over the classic ELB SDK client
pub struct SdkElbClient {
    client: aws_sdk_elasticloadbalancing::Client,
}

impl SdkElbClient {
    /// Wrap an SDK client
    pub fn new(client: aws_sdk_elasticloadbalancing::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ElbApi for SdkElbClient {
    async fn delete_load_balancer(&self, name: &str) -> Result<(), AwsError> {
        self.client
            .delete_load_balancer()
            .load_balancer_name(name)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;
        Ok(())
    }

    async fn describe_load_balancers(
        &self,
        marker: Option<String>,
    ) -> Result<Page<String>, AwsError> {
        let output = self
            .client
            .describe_load_balancers()
            .set_marker(marker)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        Ok(Page {
            items: output
                .load_balancer_descriptions()
                .iter()
                .filter_map(|lb| lb.load_balancer_name().map(str::to_string))
                .collect(),
            next_token: output.next_marker().map(str::to_string),
        })
    }

    async fn describe_tags(&self, names: &[String]) -> Result<Vec<ResourceTags>, AwsError> {
        let output = self
            .client
            .describe_tags()
            .set_load_balancer_names(Some(names.to_vec()))
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        Ok(output
            .tag_descriptions()
            .iter()
            .filter_map(|desc| {
                let name = desc.load_balancer_name()?;
                let tags = desc
                    .tags()
                    .iter()
                    .map(|t| (t.key().to_string(), t.value().unwrap_or_default().to_string()))
                    .collect();
                Some(ResourceTags {
                    id: name.to_string(),
                    tags,
                })
            })
            .collect())
    }
}

/// [`Elbv2Api`] over the ELBv2 SDK client
pub struct SdkElbv2Client {
    client: aws_sdk_elasticloadbalancingv2::Client,
}

impl SdkElbv2Client {
    /// Wrap an SDK client
    pub fn new(client: aws_sdk_elasticloadbalancingv2::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Elbv2Api for SdkElbv2Client {
    async fn delete_load_balancer(&self, arn: &str) -> Result<(), AwsError> {
        self.client
            .delete_load_balancer()
            .load_balancer_arn(arn)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;
        Ok(())
    }

    async fn delete_target_group(&self, arn: &str) -> Result<(), AwsError> {
        self.client
            .delete_target_group()
            .target_group_arn(arn)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;
        Ok(())
    }

    async fn describe_load_balancers(
        &self,
        marker: Option<String>,
    ) -> Result<Page<String>, AwsError> {
        let output = self
            .client
            .describe_load_balancers()
            .set_marker(marker)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        Ok(Page {
            items: output
                .load_balancers()
                .iter()
                .filter_map(|lb| lb.load_balancer_arn().map(str::to_string))
                .collect(),
            next_token: output.next_marker().map(str::to_string),
        })
    }

    async fn describe_target_groups(
        &self,
        marker: Option<String>,
    ) -> Result<Page<String>, AwsError> {
        let output = self
            .client
            .describe_target_groups()
            .set_marker(marker)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        Ok(Page {
            items: output
                .target_groups()
                .iter()
                .filter_map(|tg| tg.target_group_arn().map(str::to_string))
                .collect(),
            next_token: output.next_marker().map(str::to_string),
        })
    }

    async fn describe_tags(&self, arns: &[String]) -> Result<Vec<ResourceTags>, AwsError> {
        let output = self
            .client
            .describe_tags()
            .set_resource_arns(Some(arns.to_vec()))
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        Ok(output
            .tag_descriptions()
            .iter()
            .filter_map(|desc| {
                let arn = desc.resource_arn()?;
                let tags = desc
                    .tags()
                    .iter()
                    .map(|t| (t.key().to_string(), t.value().unwrap_or_default().to_string()))
                    .collect();
                Some(ResourceTags {
                    id: arn.to_string(),
                    tags,
                })
            })
            .collect())
    }
}

/// [`Ec2Api`] over the EC2 SDK client
pub struct SdkEc2Client {
    client: aws_sdk_ec2::Client,
}

impl SdkEc2Client {
    /// Wrap an SDK client
    pub fn new(client: aws_sdk_ec2::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Ec2Api for SdkEc2Client {
    async fn delete_security_group(&self, group_id: &str) -> Result<(), AwsError> {
        self.client
            .delete_security_group()
            .group_id(group_id)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;
        Ok(())
    }
}
