//! reclaim operator - deletes cloud resources left behind by Services when a
//! CAPA cluster is deleted

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use reclaim_common::infra::KubeObjectStore;
use reclaim_common::kube_utils::create_client;
use reclaim_common::telemetry::{init_telemetry, DEFAULT_LOG_DIRECTIVES};
use reclaim_gc::aws::AwsContext;
use reclaim_gc::GcStrategy;
use reclaim_operator::controller_runner::{build_controllers, RunnerConfig};

/// External resource GC controller for AWSCluster and AWSManagedControlPlane
#[derive(Parser, Debug)]
#[command(name = "reclaim-operator", version, about, long_about = None)]
struct Cli {
    /// Path to kubeconfig (in-cluster or default config when unset)
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Only watch this namespace
    #[arg(long, env = "RECLAIM_NAMESPACE")]
    namespace: Option<String>,

    /// How owned resources are discovered: tag-search or describe
    #[arg(long, env = "RECLAIM_GC_STRATEGY", default_value_t = GcStrategy::TagSearch)]
    gc_strategy: GcStrategy,

    /// Seconds before retrying a failed reconcile
    #[arg(long, env = "RECLAIM_REQUEUE_SECS", default_value_t = 30)]
    requeue_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry(DEFAULT_LOG_DIRECTIVES)?;

    let cli = Cli::parse();

    let client = create_client(cli.kubeconfig.as_deref()).await?;
    let aws = AwsContext::load().await;
    tracing::info!(aws = ?aws, strategy = %cli.gc_strategy, "starting reclaim operator");

    let config = RunnerConfig {
        namespace: cli.namespace,
        strategy: cli.gc_strategy,
        error_requeue: Duration::from_secs(cli.requeue_secs),
    };
    let store = Arc::new(KubeObjectStore::new(client.clone()));
    let controllers = build_controllers(client, store, Arc::new(aws), &config);

    futures::future::join_all(controllers).await;

    tracing::info!("reclaim operator shutting down");
    Ok(())
}
