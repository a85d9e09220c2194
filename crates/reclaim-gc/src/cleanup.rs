//! Cleanup dispatcher
//!
//! A [`CleanupTable`] maps a service namespace to the cleanup functions that
//! understand its resources. Discovered resources are grouped by namespace and
//! each group is handed to its functions in registration order. Namespaces
//! without a registration are left alone.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use reclaim_common::{Error, GcTask, Result};

use crate::aws::{AwsClients, AwsError, EC2_SERVICE, ELB_SERVICE};
use crate::discovery::TaggedResource;
use crate::loadbalancer::{LoadBalancerCleanup, TargetGroupCleanup};
use crate::securitygroup::SecurityGroupCleanup;

/// Deletes the resources of one kind from a group of discovered resources
///
/// Implementations pick out the resources they handle and ignore the rest.
/// They must tolerate resources that are already gone, since a failed pass is
/// retried from the start.
#[async_trait]
pub trait CleanupFunc: Send + Sync {
    /// Task this function implements
    fn task(&self) -> GcTask;

    /// Delete matching resources from `resources`
    async fn cleanup(&self, resources: &[TaggedResource]) -> Result<()>;
}

struct Registration {
    namespace: String,
    funcs: Vec<Arc<dyn CleanupFunc>>,
}

/// Service namespace to cleanup functions, iterated in registration order
#[derive(Default)]
pub struct CleanupTable {
    entries: Vec<Registration>,
}

impl CleanupTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a cleanup function for `namespace`
    pub fn register(&mut self, namespace: &str, func: Arc<dyn CleanupFunc>) {
        match self.entries.iter_mut().find(|e| e.namespace == namespace) {
            Some(entry) => entry.funcs.push(func),
            None => self.entries.push(Registration {
                namespace: namespace.to_string(),
                funcs: vec![func],
            }),
        }
    }

    /// Whether any function is registered for `namespace`
    pub fn is_registered(&self, namespace: &str) -> bool {
        self.entries.iter().any(|e| e.namespace == namespace)
    }

    #[cfg(test)]
    fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.namespace.as_str())
    }

    #[cfg(test)]
    fn tasks(&self, namespace: &str) -> Vec<GcTask> {
        self.entries
            .iter()
            .filter(|e| e.namespace == namespace)
            .flat_map(|e| e.funcs.iter().map(|f| f.task()))
            .collect()
    }

    /// Group resources by service namespace, dropping unregistered namespaces
    pub fn group(&self, resources: Vec<TaggedResource>) -> BTreeMap<String, Vec<TaggedResource>> {
        let mut groups: BTreeMap<String, Vec<TaggedResource>> = BTreeMap::new();
        for resource in resources {
            if !self.is_registered(&resource.arn.service) {
                debug!(
                    arn = %resource.arn,
                    service = %resource.arn.service,
                    "no cleanup registered for service, skipping"
                );
                continue;
            }
            groups
                .entry(resource.arn.service.clone())
                .or_default()
                .push(resource);
        }
        groups
    }

    /// Run the registered functions over the grouped resources
    ///
    /// Stops at the first failing function and returns its error.
    pub async fn dispatch(&self, resources: Vec<TaggedResource>) -> Result<()> {
        let groups = self.group(resources);
        for entry in &self.entries {
            let Some(group) = groups.get(&entry.namespace) else {
                continue;
            };
            for func in &entry.funcs {
                debug!(
                    service = %entry.namespace,
                    task = %func.task(),
                    count = group.len(),
                    "running cleanup"
                );
                func.cleanup(group).await?;
            }
        }
        Ok(())
    }
}

/// Cleanup table for the selected tasks, bound to `clients`
///
/// Load balancers are deleted before their target groups, and both before
/// security groups, since AWS refuses to delete resources still in use.
pub fn default_cleanup_table(clients: &AwsClients, cluster: &str, tasks: &[GcTask]) -> CleanupTable {
    let mut table = CleanupTable::new();
    for task in GcTask::ALL.into_iter().filter(|t| tasks.contains(t)) {
        match task {
            GcTask::LoadBalancer => table.register(
                ELB_SERVICE,
                Arc::new(LoadBalancerCleanup::new(
                    cluster,
                    clients.elb.clone(),
                    clients.elbv2.clone(),
                )),
            ),
            GcTask::TargetGroup => table.register(
                ELB_SERVICE,
                Arc::new(TargetGroupCleanup::new(cluster, clients.elbv2.clone())),
            ),
            GcTask::SecurityGroup => table.register(
                EC2_SERVICE,
                Arc::new(SecurityGroupCleanup::new(cluster, clients.ec2.clone())),
            ),
        }
    }
    table
}

/// Outcome of the deletes issued by one cleanup function
///
/// "Not found" counts as deleted. Other failures are collected so the rest
/// of the batch is still attempted, then reported together.
pub(crate) struct DeleteOutcomes {
    cluster: String,
    service: &'static str,
    failures: Vec<String>,
    retryable: bool,
}

impl DeleteOutcomes {
    pub(crate) fn new(cluster: &str, service: &'static str) -> Self {
        Self {
            cluster: cluster.to_string(),
            service,
            failures: Vec::new(),
            retryable: true,
        }
    }

    pub(crate) fn record(&mut self, what: &str, id: &str, result: std::result::Result<(), AwsError>) {
        match result {
            Ok(()) => info!(cluster = %self.cluster, id, "deleted {}", what),
            Err(e) if e.is_not_found() => {
                debug!(cluster = %self.cluster, id, "{} already deleted", what)
            }
            Err(e) => {
                warn!(cluster = %self.cluster, id, error = %e, "failed to delete {}", what);
                self.retryable &= e.is_retryable();
                self.failures.push(format!("deleting {what} {id}: {e}"));
            }
        }
    }

    pub(crate) fn into_result(self) -> Result<()> {
        if self.failures.is_empty() {
            return Ok(());
        }
        let message = self.failures.join("; ");
        Err(if self.retryable {
            Error::cloud_for(self.cluster, self.service, message)
        } else {
            Error::cloud_permanent(self.cluster, self.service, message)
        })
    }
}
