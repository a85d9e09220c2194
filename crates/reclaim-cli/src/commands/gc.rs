//! `reclaim gc`: switch external resource GC on or off for a cluster.
//!
//! Edits the GC annotation, the GC finalizer and the task selection directly
//! on the cluster's infrastructure object, independent of the operator.

use std::sync::Arc;

use clap::{Args, Subcommand};
use tracing::info;

use reclaim_common::infra::{resolve_infra_cluster, KubeObjectStore, ObjectStore, CAPI_CLUSTER_KIND};
use reclaim_common::task::{join_tasks, parse_task_list};
use reclaim_common::{
    ClusterScope, GcTask, MetadataGate, GC_ANNOTATION, GC_FINALIZER, GC_TASKS_ANNOTATION,
};

use crate::commands::kube_client;
use crate::{Error, Result};

/// Manage external resource garbage collection
#[derive(Args, Debug)]
pub struct GcArgs {
    #[command(subcommand)]
    pub command: GcCommand,
}

#[derive(Subcommand, Debug)]
pub enum GcCommand {
    /// Delete Service load balancers and security groups when the cluster is deleted
    Enable(ClusterArgs),
    /// Leave Service load balancers and security groups behind on cluster deletion
    Disable(ClusterArgs),
    /// Choose which GC tasks run for the cluster
    Configure(ConfigureArgs),
}

impl GcCommand {
    fn cluster(&self) -> &ClusterArgs {
        match self {
            GcCommand::Enable(c) | GcCommand::Disable(c) => c,
            GcCommand::Configure(c) => &c.cluster,
        }
    }
}

/// Identifies the target cluster
#[derive(Args, Debug, Clone)]
pub struct ClusterArgs {
    /// Name of the CAPI cluster
    #[arg(long)]
    pub cluster_name: String,

    /// Namespace of the CAPI cluster
    #[arg(long, default_value = "default")]
    pub namespace: String,

    /// Path to kubeconfig file (defaults to the standard kubeconfig resolution)
    #[arg(long)]
    pub kubeconfig: Option<String>,
}

#[derive(Args, Debug)]
pub struct ConfigureArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// GC task to run: load-balancer, target-group or security-group.
    /// Repeat for several. Without any, every task runs.
    #[arg(long = "gc-task")]
    pub gc_tasks: Vec<String>,
}

/// Applies GC admin actions to one cluster's infrastructure object
pub struct GcProcessor {
    store: Arc<dyn ObjectStore>,
    namespace: String,
    cluster_name: String,
}

impl GcProcessor {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        namespace: impl Into<String>,
        cluster_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            cluster_name: cluster_name.into(),
        }
    }

    async fn scope(&self) -> Result<ClusterScope> {
        let infra = resolve_infra_cluster(self.store.as_ref(), &self.namespace, &self.cluster_name)
            .await
            .map_err(|e| {
                if let reclaim_common::Error::NotFound { kind, .. } = &e {
                    if kind == CAPI_CLUSTER_KIND {
                        return Error::ClusterNotFound {
                            namespace: self.namespace.clone(),
                            name: self.cluster_name.clone(),
                        };
                    }
                    return Error::InfraClusterNotFound {
                        cluster: self.cluster_name.clone(),
                        message: e.to_string(),
                    };
                }
                Error::from(e)
            })?;
        Ok(ClusterScope::new(
            self.cluster_name.clone(),
            infra,
            self.store.clone(),
        ))
    }

    /// Add the GC finalizer and set the GC annotation to "true"
    pub async fn enable(&self) -> Result<()> {
        let mut scope = self.scope().await?;
        let obj = scope.infra_object_mut();
        obj.add_finalizer(GC_FINALIZER);
        obj.set_annotation(GC_ANNOTATION, "true");
        scope.patch_object().await?;

        info!(cluster = %self.cluster_name, namespace = %self.namespace, "gc enabled");
        Ok(())
    }

    /// Remove the GC finalizer and set the GC annotation to "false"
    pub async fn disable(&self) -> Result<()> {
        let mut scope = self.scope().await?;
        let obj = scope.infra_object_mut();
        obj.remove_finalizer(GC_FINALIZER);
        obj.set_annotation(GC_ANNOTATION, "false");
        scope.patch_object().await?;

        info!(cluster = %self.cluster_name, namespace = %self.namespace, "gc disabled");
        Ok(())
    }

    /// Store the task selection; an empty selection runs every task
    ///
    /// Task names are validated before the cluster is looked up.
    pub async fn configure(&self, task_names: &[String]) -> Result<Vec<GcTask>> {
        let tasks = parse_task_list(&task_names.join(",")).map_err(|e| match e {
            reclaim_common::Error::Validation { message, .. } => Error::validation(message),
            other => Error::from(other),
        })?;

        let mut scope = self.scope().await?;
        let obj = scope.infra_object_mut();
        if tasks.is_empty() {
            obj.remove_annotation(GC_TASKS_ANNOTATION);
        } else {
            obj.set_annotation(GC_TASKS_ANNOTATION, &join_tasks(&tasks));
        }
        scope.patch_object().await?;

        info!(
            cluster = %self.cluster_name,
            namespace = %self.namespace,
            tasks = %join_tasks(&tasks),
            "gc tasks configured"
        );
        Ok(tasks)
    }
}

/// Run a gc subcommand.
pub async fn run(args: GcArgs) -> Result<()> {
    let cluster = args.command.cluster().clone();
    let client = kube_client(cluster.kubeconfig.as_deref()).await?;
    let processor = GcProcessor::new(
        Arc::new(KubeObjectStore::new(client)),
        &cluster.namespace,
        &cluster.cluster_name,
    );
    let target = format!("{}/{}", cluster.namespace, cluster.cluster_name);

    match args.command {
        GcCommand::Enable(_) => {
            processor.enable().await?;
            println!("Enabled external resource GC for cluster {}.", target);
        }
        GcCommand::Disable(_) => {
            processor.disable().await?;
            println!("Disabled external resource GC for cluster {}.", target);
        }
        GcCommand::Configure(c) => {
            let tasks = processor.configure(&c.gc_tasks).await?;
            if tasks.is_empty() {
                println!("Cluster {} will run all GC tasks.", target);
            } else {
                println!(
                    "Configured GC tasks for cluster {}: {}.",
                    target,
                    join_tasks(&tasks)
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use kube::api::DynamicObject;

    use reclaim_common::infra::ObjectRef;
    use reclaim_test_utils::fixtures::{aws_cluster_ref, aws_managed_control_plane_ref};
    use reclaim_test_utils::{aws_cluster, aws_managed_control_plane, capi_cluster, InMemoryObjectStore};

    use crate::{Cli, Commands};

    fn store_with_cluster() -> (InMemoryObjectStore, ObjectRef) {
        let store = InMemoryObjectStore::new();
        let infra_ref = aws_cluster_ref("ns1", "cluster1-infra");
        store.insert(
            &ObjectRef::capi_cluster("ns1", "cluster1"),
            capi_cluster("ns1", "cluster1", &infra_ref),
        );
        store.insert(&infra_ref, aws_cluster("ns1", "cluster1-infra", "cluster1"));
        (store, infra_ref)
    }

    fn processor(store: &InMemoryObjectStore) -> GcProcessor {
        GcProcessor::new(Arc::new(store.clone()), "ns1", "cluster1")
    }

    fn infra(store: &InMemoryObjectStore, reference: &ObjectRef) -> DynamicObject {
        store.object(reference).unwrap()
    }

    #[tokio::test]
    async fn enable_sets_annotation_and_finalizer() {
        let (store, infra_ref) = store_with_cluster();

        processor(&store).enable().await.unwrap();

        let obj = infra(&store, &infra_ref);
        assert_eq!(obj.annotation(GC_ANNOTATION), Some("true"));
        assert!(obj.contains_finalizer(GC_FINALIZER));
    }

    #[tokio::test]
    async fn disable_clears_finalizer() {
        let (store, infra_ref) = store_with_cluster();
        let p = processor(&store);

        p.enable().await.unwrap();
        p.disable().await.unwrap();

        let obj = infra(&store, &infra_ref);
        assert_eq!(obj.annotation(GC_ANNOTATION), Some("false"));
        assert!(!obj.contains_finalizer(GC_FINALIZER));
    }

    #[tokio::test]
    async fn enable_disable_enable_matches_single_enable() {
        let (once, once_ref) = store_with_cluster();
        processor(&once).enable().await.unwrap();

        let (cycled, cycled_ref) = store_with_cluster();
        let p = processor(&cycled);
        p.enable().await.unwrap();
        p.disable().await.unwrap();
        p.enable().await.unwrap();

        let a = infra(&once, &once_ref);
        let b = infra(&cycled, &cycled_ref);
        assert_eq!(a.metadata.annotations, b.metadata.annotations);
        assert_eq!(a.metadata.finalizers, b.metadata.finalizers);
    }

    #[tokio::test]
    async fn repeated_enable_sends_one_patch() {
        let (store, _) = store_with_cluster();
        let p = processor(&store);

        p.enable().await.unwrap();
        p.enable().await.unwrap();

        assert_eq!(store.patches().len(), 1);
    }

    #[tokio::test]
    async fn enable_works_on_managed_control_plane() {
        let store = InMemoryObjectStore::new();
        let cp_ref = aws_managed_control_plane_ref("ns1", "cluster1-cp");
        store.insert(
            &ObjectRef::capi_cluster("ns1", "cluster1"),
            capi_cluster("ns1", "cluster1", &cp_ref),
        );
        store.insert(
            &cp_ref,
            aws_managed_control_plane("ns1", "cluster1-cp", "cluster1", "eks-test-cluster"),
        );

        processor(&store).enable().await.unwrap();

        assert!(infra(&store, &cp_ref).contains_finalizer(GC_FINALIZER));
    }

    #[tokio::test]
    async fn configure_persists_task_selection() {
        let (store, infra_ref) = store_with_cluster();

        let tasks = processor(&store)
            .configure(&["security-group".to_string(), "load-balancer".to_string()])
            .await
            .unwrap();

        assert_eq!(tasks, vec![GcTask::SecurityGroup, GcTask::LoadBalancer]);
        assert_eq!(
            infra(&store, &infra_ref).annotation(GC_TASKS_ANNOTATION),
            Some("security-group,load-balancer")
        );
    }

    #[tokio::test]
    async fn configure_without_tasks_clears_selection() {
        let (store, infra_ref) = store_with_cluster();
        let p = processor(&store);

        p.configure(&["target-group".to_string()]).await.unwrap();
        let tasks = p.configure(&[]).await.unwrap();

        assert!(tasks.is_empty());
        assert!(!infra(&store, &infra_ref).has_annotation(GC_TASKS_ANNOTATION));
    }

    #[tokio::test]
    async fn configure_rejects_unknown_task_before_lookup() {
        let store = InMemoryObjectStore::new();

        let err = processor(&store)
            .configure(&["INVALID".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.to_string().contains("INVALID"));
    }

    #[tokio::test]
    async fn missing_cluster_is_reported() {
        let store = InMemoryObjectStore::new();

        let err = processor(&store).enable().await.unwrap_err();

        assert!(matches!(err, Error::ClusterNotFound { .. }));
        assert_eq!(err.to_string(), "cluster not found: ns1/cluster1");
    }

    #[tokio::test]
    async fn missing_infra_object_is_reported() {
        let store = InMemoryObjectStore::new();
        store.insert(
            &ObjectRef::capi_cluster("ns1", "cluster1"),
            capi_cluster("ns1", "cluster1", &aws_cluster_ref("ns1", "gone")),
        );

        let err = processor(&store).disable().await.unwrap_err();

        assert!(matches!(err, Error::InfraClusterNotFound { .. }));
        assert!(err.to_string().contains("AWSCluster ns1/gone not found"));
    }

    #[test]
    fn configure_accepts_repeated_gc_task_flags() {
        let cli = Cli::try_parse_from([
            "reclaim",
            "gc",
            "configure",
            "--cluster-name",
            "cluster1",
            "--gc-task",
            "load-balancer",
            "--gc-task",
            "security-group",
        ])
        .unwrap();

        let Commands::Gc(GcArgs {
            command: GcCommand::Configure(args),
        }) = cli.command
        else {
            panic!("expected gc configure");
        };
        assert_eq!(args.cluster.cluster_name, "cluster1");
        assert_eq!(args.cluster.namespace, "default");
        assert!(args.cluster.kubeconfig.is_none());
        assert_eq!(args.gc_tasks, vec!["load-balancer", "security-group"]);
    }

    #[test]
    fn cluster_name_is_required() {
        assert!(Cli::try_parse_from(["reclaim", "gc", "enable"]).is_err());
    }
}
