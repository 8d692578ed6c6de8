use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::api::ListParams;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use std::collections::HashSet;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::parsing::decode_pod;
use crate::types::PodObservation;

/// Fail fast at startup when the API server is not reachable.
pub async fn ensure_cluster_reachable(client: &Client) -> Result<()> {
    let version = client
        .apiserver_version()
        .await
        .context("Kubernetes API server is not reachable")?;
    info!("connected to Kubernetes {}", version.git_version);
    Ok(())
}

/// Namespaces an operator may pick from when pausing.
#[async_trait]
pub trait NamespaceSource: Send + Sync {
    async fn namespaces(&self) -> Result<Vec<String>>;
}

/// Fixed list from configuration.
pub struct StaticNamespaces(pub Vec<String>);

#[async_trait]
impl NamespaceSource for StaticNamespaces {
    async fn namespaces(&self) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

/// Lists namespaces live from the cluster, minus the excluded ones.
pub struct KubeNamespaces {
    client: Client,
    excluded: HashSet<String>,
}

impl KubeNamespaces {
    pub fn new(client: Client, excluded: HashSet<String>) -> Self {
        Self { client, excluded }
    }
}

#[async_trait]
impl NamespaceSource for KubeNamespaces {
    async fn namespaces(&self) -> Result<Vec<String>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .context("Failed to list namespaces")?;
        let mut names: Vec<String> = list
            .items
            .into_iter()
            .filter_map(|ns| ns.metadata.name)
            .filter(|name| !self.excluded.contains(name))
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Flatten one watch event into observations. A resync re-delivers every
/// current pod and is treated like a batch of updates; deletions are ignored.
pub fn observations_from_event(event: watcher::Event<Pod>) -> Vec<PodObservation> {
    let pods = match event {
        watcher::Event::Applied(pod) => vec![pod],
        watcher::Event::Restarted(pods) => pods,
        watcher::Event::Deleted(_) => return Vec::new(),
    };
    pods.iter()
        .filter_map(|pod| match decode_pod(pod) {
            Ok(obs) => Some(obs),
            Err(e) => {
                warn!("skipping undecodable pod: {}", e);
                None
            }
        })
        .collect()
}

/// Watch pods cluster-wide and forward observations until shutdown.
pub async fn forward_pod_events(
    client: Client,
    field_selector: Option<String>,
    tx: mpsc::Sender<PodObservation>,
    mut shutdown: watch::Receiver<bool>,
) {
    let api: Api<Pod> = Api::all(client);
    let mut config = watcher::Config::default();
    if let Some(selector) = field_selector.as_deref() {
        config = config.fields(selector);
    }
    info!("watching pods (field selector: {:?})", field_selector);

    let stream = watcher(api, config).default_backoff();
    futures::pin_mut!(stream);

    loop {
        let next = tokio::select! {
            _ = shutdown.changed() => break,
            next = stream.next() => next,
        };
        match next {
            Some(Ok(event)) => {
                for obs in observations_from_event(event) {
                    if tx.send(obs).await.is_err() {
                        debug!("event watcher gone, stopping pod watch");
                        return;
                    }
                }
            }
            Some(Err(e)) => warn!("pod watch error: {}", e),
            None => break,
        }
    }
    info!("pod watch stopped");
}
