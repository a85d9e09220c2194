//! AWS building blocks: ARNs, tags, error classification and service clients

pub mod arn;
pub mod clients;
pub mod context;
pub mod error;
pub mod tags;

pub use arn::Arn;
pub use clients::{Ec2Api, ElbApi, Elbv2Api, Page, ResourceTags, TaggingApi};
pub use context::{AwsClients, AwsContext, ClientFactory};
pub use error::AwsError;

/// Service namespace of classic and v2 load balancers and target groups
pub const ELB_SERVICE: &str = "elasticloadbalancing";

/// Service namespace of EC2 resources
pub const EC2_SERVICE: &str = "ec2";
