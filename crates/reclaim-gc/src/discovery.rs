//! Resource discovery
//!
//! Finds the cloud resources owned by a cluster. The default strategy asks the
//! tagging API for everything tagged `kubernetes.io/cluster/<name>=owned`; the
//! describe strategy walks the load balancer APIs and filters by tags instead,
//! for accounts where the tagging API is unavailable.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;

use tracing::debug;

use reclaim_common::{Error, Result};

use crate::aws::arn::compose_arn;
use crate::aws::tags::{chunk_resources, cluster_tag_key, is_owned_by, OWNED};
use crate::aws::{Arn, AwsClients, AwsError, ElbApi, Elbv2Api, Page, TaggingApi, ELB_SERVICE};

/// Prefix of classic load balancer resource paths
pub const ELB_RESOURCE_PREFIX: &str = "loadbalancer/";

/// A discovered cloud resource and its tags
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaggedResource {
    /// Parsed ARN
    pub arn: Arn,
    /// Tag key to value
    pub tags: BTreeMap<String, String>,
}

impl TaggedResource {
    /// Parse an ARN and attach its tags
    pub fn parse(arn: &str, tags: BTreeMap<String, String>) -> Result<Self> {
        Ok(Self {
            arn: arn.parse()?,
            tags,
        })
    }

    /// Non-empty value of a tag
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// How owned resources are discovered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GcStrategy {
    /// Resource Groups Tagging API search on the ownership tag
    #[default]
    TagSearch,
    /// Describe load balancers and target groups, then filter by tags
    Describe,
}

impl fmt::Display for GcStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcStrategy::TagSearch => f.write_str("tag-search"),
            GcStrategy::Describe => f.write_str("describe"),
        }
    }
}

impl FromStr for GcStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tag-search" => Ok(GcStrategy::TagSearch),
            "describe" => Ok(GcStrategy::Describe),
            other => Err(Error::validation(format!(
                "invalid gc strategy {other:?}, valid values are: tag-search, describe"
            ))),
        }
    }
}

/// Cluster identity needed to discover its resources
#[derive(Clone, Debug)]
pub struct DiscoveryTarget<'a> {
    /// CAPI cluster name, for error context
    pub cluster: &'a str,
    /// Name in the ownership tag
    pub kubernetes_cluster_name: &'a str,
    /// Region the clients are bound to
    pub region: &'a str,
}

/// Discover resources owned by the target cluster
pub async fn discover(
    strategy: GcStrategy,
    clients: &AwsClients,
    target: &DiscoveryTarget<'_>,
) -> Result<Vec<TaggedResource>> {
    let resources = match strategy {
        GcStrategy::TagSearch => discover_by_tag_search(clients.tagging.as_ref(), target).await?,
        GcStrategy::Describe => {
            let mut resources =
                discover_classic_load_balancers(clients.elb.as_ref(), target).await?;
            resources.extend(discover_v2_resources(clients.elbv2.as_ref(), target).await?);
            resources
        }
    };
    debug!(
        cluster = %target.cluster,
        %strategy,
        count = resources.len(),
        "discovered owned resources"
    );
    Ok(resources)
}

/// Page through the tagging API for everything tagged as owned by the cluster
///
/// Any ARN that fails to parse aborts discovery so no partial cleanup runs.
pub async fn discover_by_tag_search(
    tagging: &dyn TaggingApi,
    target: &DiscoveryTarget<'_>,
) -> Result<Vec<TaggedResource>> {
    let tag_key = cluster_tag_key(target.kubernetes_cluster_name);
    let mut resources = Vec::new();
    let mut token = None;

    loop {
        let page = tagging
            .get_resources(&tag_key, OWNED, token.take())
            .await
            .map_err(|e| {
                Error::cloud_for(
                    target.cluster,
                    "tagging",
                    format!("getting tagged resources: {e}"),
                )
            })?;

        for item in page.items {
            resources.push(TaggedResource::parse(&item.id, item.tags)?);
        }

        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    Ok(resources)
}

async fn collect_pages<F, Fut>(mut fetch: F) -> std::result::Result<Vec<String>, AwsError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = std::result::Result<Page<String>, AwsError>>,
{
    let mut items = Vec::new();
    let mut marker = None;
    loop {
        let page = fetch(marker.take()).await?;
        items.extend(page.items);
        match page.next_token {
            Some(next) => marker = Some(next),
            None => return Ok(items),
        }
    }
}

/// Classic load balancers tagged as owned by the cluster
pub async fn discover_classic_load_balancers(
    elb: &dyn ElbApi,
    target: &DiscoveryTarget<'_>,
) -> Result<Vec<TaggedResource>> {
    let names = collect_pages(|marker| elb.describe_load_balancers(marker))
        .await
        .map_err(|e| {
            Error::cloud_for(
                target.cluster,
                ELB_SERVICE,
                format!("describing classic load balancers: {e}"),
            )
        })?;

    let mut resources = Vec::new();
    for chunk in chunk_resources(&names) {
        let described = elb.describe_tags(&chunk).await.map_err(|e| {
            Error::cloud_for(
                target.cluster,
                ELB_SERVICE,
                format!("describing classic load balancer tags: {e}"),
            )
        })?;
        for desc in described {
            if !is_owned_by(&desc.tags, target.kubernetes_cluster_name) {
                continue;
            }
            let arn = compose_arn(
                ELB_SERVICE,
                target.region,
                "",
                &format!("{ELB_RESOURCE_PREFIX}{}", desc.id),
            );
            resources.push(TaggedResource {
                arn,
                tags: desc.tags,
            });
        }
    }
    Ok(resources)
}

/// v2 load balancers and target groups tagged as owned by the cluster
pub async fn discover_v2_resources(
    elbv2: &dyn Elbv2Api,
    target: &DiscoveryTarget<'_>,
) -> Result<Vec<TaggedResource>> {
    let mut arns = collect_pages(|marker| elbv2.describe_load_balancers(marker))
        .await
        .map_err(|e| {
            Error::cloud_for(
                target.cluster,
                ELB_SERVICE,
                format!("describing v2 load balancers: {e}"),
            )
        })?;
    arns.extend(
        collect_pages(|marker| elbv2.describe_target_groups(marker))
            .await
            .map_err(|e| {
                Error::cloud_for(
                    target.cluster,
                    ELB_SERVICE,
                    format!("describing target groups: {e}"),
                )
            })?,
    );

    let mut resources = Vec::new();
    for chunk in chunk_resources(&arns) {
        let described = elbv2.describe_tags(&chunk).await.map_err(|e| {
            Error::cloud_for(
                target.cluster,
                ELB_SERVICE,
                format!("describing v2 tags: {e}"),
            )
        })?;
        for desc in described {
            if is_owned_by(&desc.tags, target.kubernetes_cluster_name) {
                resources.push(TaggedResource::parse(&desc.id, desc.tags)?);
            }
        }
    }
    Ok(resources)
}
