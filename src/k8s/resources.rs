//! The resource client capability consumed by the poller and the watch
//! supervisor, and its implementation against a live api server.
use super::client_manager::{K8sClientManager, should_refresh_client};
use crate::config::WATCH_TIMEOUT_SECONDS;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{Endpoints, Event, Node, Pod, ReplicationController, Service};
use kube::Client;
use kube::api::{Api, ListParams, WatchEvent, WatchParams};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::debug;

/// Render a service selector as a label selector string, `k1=v1,k2=v2`.
/// An empty selector renders as the empty string, which matches everything.
#[must_use]
pub fn label_selector(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// One live connection to the cluster event feed.
///
/// `next` yields events in delivery order and `None` once the feed is closed,
/// either by the server or by `stop`.
pub struct Subscription {
    stream: Option<BoxStream<'static, Result<WatchEvent<Event>>>>,
}

impl Subscription {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<WatchEvent<Event>>> + Send + 'static,
    {
        Self {
            stream: Some(stream.boxed()),
        }
    }

    /// Wait for the next item; `None` means the subscription is closed.
    pub async fn next(&mut self) -> Option<Result<WatchEvent<Event>>> {
        let item = match self.stream.as_mut() {
            Some(stream) => stream.next().await,
            None => None,
        };
        if item.is_none() {
            self.stream = None;
        }
        item
    }

    /// Release the underlying connection. Idempotent.
    pub fn stop(&mut self) {
        self.stream = None;
    }

    #[cfg(test)]
    const fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

/// List and watch operations the exporter needs from the orchestration api.
///
/// Lists are cluster-wide except endpoints, which are scoped to one namespace
/// and filtered by a label selector.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn list_replication_controllers(&self) -> Result<Vec<ReplicationController>>;

    async fn list_services(&self) -> Result<Vec<Service>>;

    async fn list_endpoints(&self, namespace: &str, selector: &str) -> Result<Vec<Endpoints>>;

    async fn list_nodes(&self) -> Result<Vec<Node>>;

    async fn list_pods(&self) -> Result<Vec<Pod>>;

    /// Open a fresh subscription to events in all namespaces
    async fn watch_events(&self) -> Result<Subscription>;
}

/// `ResourceClient` backed by the Kubernetes api via kube.
pub struct KubeResourceClient {
    clients: K8sClientManager,
}

impl KubeResourceClient {
    /// Client for `kube_addr`, or the inferred kubeconfig when `None`.
    /// Nothing is contacted until the first request.
    #[must_use]
    pub const fn new(kube_addr: Option<String>) -> Self {
        Self {
            clients: K8sClientManager::new(kube_addr),
        }
    }

    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self {
            clients: K8sClientManager::with_client(client),
        }
    }

    /// Drop the cached client after auth failures so the next attempt re-reads credentials
    async fn query_failed(&self, e: kube::Error) -> Error {
        if should_refresh_client(&e) {
            self.clients.invalidate().await;
        }
        Error::from(e)
    }

    async fn list<K>(
        &self,
        api: impl FnOnce(Client) -> Api<K> + Send,
        lp: ListParams,
    ) -> Result<Vec<K>>
    where
        K: Clone + DeserializeOwned + Debug + Send,
    {
        let client = self.clients.get_client().await?;
        match api(client).list(&lp).await {
            Ok(list) => Ok(list.items),
            Err(e) => Err(self.query_failed(e).await),
        }
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn list_replication_controllers(&self) -> Result<Vec<ReplicationController>> {
        self.list(Api::all, ListParams::default()).await
    }

    async fn list_services(&self) -> Result<Vec<Service>> {
        self.list(Api::all, ListParams::default()).await
    }

    async fn list_endpoints(&self, namespace: &str, selector: &str) -> Result<Vec<Endpoints>> {
        let lp = if selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(selector)
        };
        self.list(|client| Api::namespaced(client, namespace), lp).await
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.list(Api::all, ListParams::default()).await
    }

    async fn list_pods(&self) -> Result<Vec<Pod>> {
        self.list(Api::all, ListParams::default()).await
    }

    async fn watch_events(&self) -> Result<Subscription> {
        let client = self.clients.get_client().await?;
        let events: Api<Event> = Api::all(client);
        let wp = WatchParams::default().timeout(WATCH_TIMEOUT_SECONDS);

        match events.watch(&wp, "0").await {
            Ok(stream) => {
                debug!("event watch opened");
                Ok(Subscription::new(stream.map_err(Error::from)))
            }
            Err(e) => Err(self.query_failed(e).await),
        }
    }
}
