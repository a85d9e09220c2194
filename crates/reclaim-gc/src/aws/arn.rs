//! Amazon Resource Names

use std::fmt;
use std::str::FromStr;

use reclaim_common::Error;

const ARN_PREFIX: &str = "arn";
const ARN_SECTIONS: usize = 6;

/// A parsed ARN: `arn:<partition>:<service>:<region>:<account>:<resource>`
///
/// The resource part may itself contain `:` and `/`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Arn {
    /// `aws`, `aws-cn` or `aws-us-gov`
    pub partition: String,
    /// Service namespace, e.g. `elasticloadbalancing`
    pub service: String,
    /// Region, empty for global resources
    pub region: String,
    /// Owning account, may be empty
    pub account_id: String,
    /// Resource path, e.g. `loadbalancer/net/name/id`
    pub resource: String,
}

impl Arn {
    /// Resource type: the resource path up to the first `/` or `:`
    pub fn resource_type(&self) -> &str {
        self.resource
            .split(['/', ':'])
            .next()
            .unwrap_or(&self.resource)
    }

    /// Whether this ARN names a `resource_type` resource of `service`
    pub fn is(&self, service: &str, resource_type: &str) -> bool {
        self.service == service && self.resource_type() == resource_type
    }
}

impl FromStr for Arn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sections: Vec<&str> = s.splitn(ARN_SECTIONS, ':').collect();
        if sections[0] != ARN_PREFIX {
            return Err(Error::arn(s, "invalid prefix"));
        }
        if sections.len() != ARN_SECTIONS {
            return Err(Error::arn(s, "not enough sections"));
        }
        Ok(Arn {
            partition: sections[1].to_string(),
            service: sections[2].to_string(),
            region: sections[3].to_string(),
            account_id: sections[4].to_string(),
            resource: sections[5].to_string(),
        })
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}",
            ARN_PREFIX, self.partition, self.service, self.region, self.account_id, self.resource
        )
    }
}

/// Partition a region belongs to
pub fn partition_for_region(region: &str) -> &'static str {
    if region.starts_with("cn-") {
        "aws-cn"
    } else if region.starts_with("us-gov-") {
        "aws-us-gov"
    } else {
        "aws"
    }
}

/// Build an ARN for a resource in `region`, deriving the partition
pub fn compose_arn(service: &str, region: &str, account_id: &str, resource: &str) -> Arn {
    Arn {
        partition: partition_for_region(region).to_string(),
        service: service.to_string(),
        region: region.to_string(),
        account_id: account_id.to_string(),
        resource: resource.to_string(),
    }
}
