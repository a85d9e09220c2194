//! Controller runner - builds one controller future per infrastructure kind

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::DynamicObject;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use reclaim_common::infra::{
    ObjectStore, AWS_CLUSTER_API_VERSION, AWS_CLUSTER_KIND, AWS_MANAGED_CONTROL_PLANE_API_VERSION,
    AWS_MANAGED_CONTROL_PLANE_KIND,
};
use reclaim_common::kube_utils::build_api_resource;
use reclaim_gc::aws::ClientFactory;
use reclaim_gc::GcStrategy;

use crate::controller::{error_policy, reconcile, Context};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Settings shared by every controller
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Namespace to watch, all namespaces when unset
    pub namespace: Option<String>,
    /// Discovery strategy for cleanup passes
    pub strategy: GcStrategy,
    /// Requeue delay after a retryable error
    pub error_requeue: Duration,
}

/// Build controllers for `AWSCluster` and `AWSManagedControlPlane`
pub fn build_controllers(
    client: Client,
    store: Arc<dyn ObjectStore>,
    aws: Arc<dyn ClientFactory>,
    config: &RunnerConfig,
) -> Vec<Pin<Box<dyn Future<Output = ()> + Send>>> {
    [
        (AWS_CLUSTER_API_VERSION, AWS_CLUSTER_KIND),
        (AWS_MANAGED_CONTROL_PLANE_API_VERSION, AWS_MANAGED_CONTROL_PLANE_KIND),
    ]
    .into_iter()
    .map(|(api_version, kind)| {
        let ar = build_api_resource(api_version, kind);
        let api: Api<DynamicObject> = match &config.namespace {
            Some(ns) => Api::namespaced_with(client.clone(), ns, &ar),
            None => Api::all_with(client.clone(), &ar),
        };
        let ctx = Arc::new(Context::new(
            store.clone(),
            aws.clone(),
            ar.clone(),
            config.strategy,
            config.error_requeue,
        ));

        tracing::info!(kind, "- {} controller", kind);

        let controller: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(
            Controller::new_with(
                api,
                WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
                ar,
            )
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result(kind)),
        );
        controller
    })
    .collect()
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
