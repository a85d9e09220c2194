//! The GC service and its reconciliation entry points

use tracing::{debug, info, instrument};

use reclaim_common::{gc_enabled, gc_tasks, ClusterScope, GcTask, MetadataGate, Result, GC_FINALIZER};

use crate::aws::AwsClients;
use crate::cleanup::{default_cleanup_table, CleanupTable};
use crate::discovery::{discover, DiscoveryTarget, GcStrategy};

/// External resource GC for one cluster
///
/// Built fresh for every reconciliation and dropped afterwards. The only state
/// that survives between passes is the finalizer and annotations on the
/// infrastructure object.
pub struct GcService {
    scope: ClusterScope,
    clients: AwsClients,
    table: Option<CleanupTable>,
    strategy: GcStrategy,
    region: String,
}

impl GcService {
    /// Service for `scope` using the default cleanup table
    pub fn new(scope: ClusterScope, clients: AwsClients, region: impl Into<String>) -> Self {
        Self {
            scope,
            clients,
            table: None,
            strategy: GcStrategy::default(),
            region: region.into(),
        }
    }

    /// Replace the cleanup table
    ///
    /// The task selection annotation is ignored once a table is injected.
    pub fn with_cleanup_table(mut self, table: CleanupTable) -> Self {
        self.table = Some(table);
        self
    }

    /// Use another discovery strategy
    pub fn with_strategy(mut self, strategy: GcStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Add the GC finalizer when GC is enabled
    ///
    /// Never removes the finalizer. Once it is present this sends no request.
    #[instrument(skip(self), fields(cluster = %self.scope.name()))]
    pub async fn reconcile(&mut self) -> Result<()> {
        if !gc_enabled(self.scope.infra_object())? {
            debug!("external resource gc disabled, not adding finalizer");
            return Ok(());
        }

        if self.scope.infra_object_mut().add_finalizer(GC_FINALIZER) {
            debug!(finalizer = GC_FINALIZER, "adding gc finalizer");
        }
        self.scope.patch_object().await
    }

    /// Delete owned cloud resources, then release the GC finalizer
    ///
    /// The finalizer stays in place when cleanup fails, blocking deletion of
    /// the object until a later pass succeeds. With GC disabled no cleanup
    /// runs and the finalizer is released straight away.
    #[instrument(skip(self), fields(cluster = %self.scope.name()))]
    pub async fn reconcile_delete(&mut self) -> Result<()> {
        if gc_enabled(self.scope.infra_object())? {
            self.delete_resources().await?;
        } else {
            info!("external resource gc disabled, skipping cleanup");
        }

        if self.scope.infra_object_mut().remove_finalizer(GC_FINALIZER) {
            debug!(finalizer = GC_FINALIZER, "removing gc finalizer");
        }
        self.scope.patch_object().await
    }

    /// Discover the cluster's resources and run the cleanup table over them
    ///
    /// Fails before any AWS call when the task selection annotation names an
    /// unknown task.
    pub async fn delete_resources(&self) -> Result<()> {
        let default_table;
        let table = match &self.table {
            Some(table) => table,
            None => {
                let tasks = gc_tasks(self.scope.infra_object())?
                    .unwrap_or_else(|| GcTask::ALL.to_vec());
                default_table = default_cleanup_table(&self.clients, self.scope.name(), &tasks);
                &default_table
            }
        };

        let kubernetes_cluster_name = self.scope.kubernetes_cluster_name();
        let target = DiscoveryTarget {
            cluster: self.scope.name(),
            kubernetes_cluster_name: &kubernetes_cluster_name,
            region: &self.region,
        };

        let resources = discover(self.strategy, &self.clients, &target).await?;
        if resources.is_empty() {
            debug!(cluster = %self.scope.name(), "no owned resources found");
            return Ok(());
        }

        table.dispatch(resources).await?;
        info!(cluster = %self.scope.name(), "finished external resource cleanup");
        Ok(())
    }
}
