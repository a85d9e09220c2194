//! CLI commands

use std::path::Path;

use kube::Client;

use reclaim_common::kube_utils::create_client;

use crate::{Error, Result};

pub mod gc;

/// Build a kube [`Client`] from `--kubeconfig`, or the kube defaults
/// (in-cluster / `KUBECONFIG` env / `~/.kube/config`) when unset.
pub async fn kube_client(kubeconfig: Option<&str>) -> Result<Client> {
    create_client(kubeconfig.map(Path::new))
        .await
        .map_err(|e| Error::command_failed(format!("failed to create kube client: {}", e)))
}
