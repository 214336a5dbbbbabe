//! Periodic snapshot polling: controllers, services and nodes are queried
//! concurrently on every tick, then pods are counted per node using the
//! address map built from the node snapshot of the same cycle.
use crate::config::{ERROR_COUNTER, ExporterConfig};
use crate::error::Result;
use crate::k8s::resources::{ResourceClient, label_selector};
use crate::metrics::MetricsSink;
use k8s_openapi::api::core::v1::{Endpoints, Node, Pod, ReplicationController, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Bucket a node falls into, from its `Ready` condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady,
    /// No `Ready` condition reported at all
    Unknown,
}

#[must_use]
pub fn node_readiness(node: &Node) -> Readiness {
    let ready = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"));

    match ready {
        Some(c) if c.status == "True" => Readiness::Ready,
        Some(_) => Readiness::NotReady,
        None => Readiness::Unknown,
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NodeStatusCounts {
    pub ready: i64,
    pub notready: i64,
    pub unknown: i64,
}

#[must_use]
pub fn count_node_status(nodes: &[Node]) -> NodeStatusCounts {
    nodes
        .iter()
        .fold(NodeStatusCounts::default(), |mut counts, node| {
            match node_readiness(node) {
                Readiness::Ready => counts.ready += 1,
                Readiness::NotReady => counts.notready += 1,
                Readiness::Unknown => counts.unknown += 1,
            }
            counts
        })
}

/// Map each node's first reported address to the node's name.
/// Nodes without addresses are left out.
#[must_use]
pub fn address_map(nodes: &[Node]) -> HashMap<String, String> {
    nodes
        .iter()
        .filter_map(|node| {
            let address = node
                .status
                .as_ref()?
                .addresses
                .as_ref()?
                .first()?
                .address
                .clone();
            Some((address, node.metadata.name.clone().unwrap_or_default()))
        })
        .collect()
}

/// Count pods per node name. Pods whose host address maps to no known node,
/// including pods not yet scheduled, are reported under the empty name.
#[must_use]
pub fn pods_per_node(pods: &[Pod], names: &HashMap<String, String>) -> BTreeMap<String, i64> {
    let mut by_address: HashMap<&str, i64> = HashMap::new();
    for pod in pods {
        let host_ip = pod
            .status
            .as_ref()
            .and_then(|s| s.host_ip.as_deref())
            .unwrap_or_default();
        *by_address.entry(host_ip).or_insert(0) += 1;
    }

    let mut by_name = BTreeMap::new();
    for (address, count) in by_address {
        let name = names.get(address).cloned().unwrap_or_default();
        *by_name.entry(name).or_insert(0) += count;
    }
    by_name
}

/// Total addresses across all subsets of all endpoints
#[must_use]
pub fn endpoint_address_count(endpoints: &[Endpoints]) -> i64 {
    let total: usize = endpoints
        .iter()
        .flat_map(|ep| ep.subsets.iter().flatten())
        .map(|subset| subset.addresses.as_ref().map_or(0, Vec::len))
        .sum();
    i64::try_from(total).unwrap_or(i64::MAX)
}

/// Declared replicas, falling back to the observed count
#[must_use]
pub fn replica_count(rc: &ReplicationController) -> i64 {
    let declared = rc.spec.as_ref().and_then(|s| s.replicas);
    let observed = rc.status.as_ref().map(|s| s.replicas);
    i64::from(declared.or(observed).unwrap_or(0))
}

/// `<namespace>.<name>`
fn qualified_name(meta: &ObjectMeta) -> String {
    format!(
        "{}.{}",
        meta.namespace.as_deref().unwrap_or_default(),
        meta.name.as_deref().unwrap_or_default()
    )
}

pub struct PollOrchestrator {
    config: Arc<ExporterConfig>,
    client: Arc<dyn ResourceClient>,
    sink: Arc<dyn MetricsSink>,
}

impl PollOrchestrator {
    #[must_use]
    pub fn new(
        config: Arc<ExporterConfig>,
        client: Arc<dyn ResourceClient>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            config,
            client,
            sink,
        }
    }

    /// Poll once immediately, then on every tick until `token` is cancelled.
    /// A cycle in flight when cancellation arrives is abandoned.
    pub async fn run(&self, token: CancellationToken) {
        info!("⏱️  Poller started (every {:?})", self.config.interval);

        // the first tick completes immediately
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    debug!("poller ticked");
                    tokio::select! {
                        biased;
                        () = token.cancelled() => break,
                        () = self.poll_cycle() => {}
                    }
                }
            }
        }

        info!("⏱️  Poller cancelled");
    }

    /// One full cycle: the three top-level queries run concurrently and fail
    /// independently of each other.
    pub async fn poll_cycle(&self) {
        debug!("polling kubernetes api");
        tokio::join!(
            self.poll_controllers(),
            self.poll_services(),
            self.poll_nodes()
        );
    }

    /// Unwrap a query result. Failures are logged at debug; failed requests
    /// (but not failures to build a client) also bump the shared error counter.
    fn absorb<T>(&self, what: &str, result: Result<Vec<T>>) -> Option<Vec<T>> {
        match result {
            Ok(items) => Some(items),
            Err(e) if e.is_connection() => {
                debug!("{}: client not created: {}", what, e);
                None
            }
            Err(e) => {
                debug!("{} query failed: {}", what, e);
                self.sink.incr(ERROR_COUNTER);
                None
            }
        }
    }

    async fn poll_controllers(&self) {
        debug!("polling replication controllers");
        let result = self.client.list_replication_controllers().await;
        let Some(rcs) = self.absorb("replication controllers", result) else {
            return;
        };

        for rc in &rcs {
            self.sink
                .gauge(&format!("rc.{}", qualified_name(&rc.metadata)), replica_count(rc));
        }
    }

    async fn poll_services(&self) {
        debug!("polling services");
        let result = self.client.list_services().await;
        let Some(services) = self.absorb("services", result) else {
            return;
        };

        futures::future::join_all(services.iter().map(|svc| self.report_service(svc))).await;
    }

    async fn report_service(&self, svc: &Service) {
        let namespace = svc.metadata.namespace.as_deref().unwrap_or_default();
        let selector = svc
            .spec
            .as_ref()
            .and_then(|s| s.selector.as_ref())
            .map(label_selector)
            .unwrap_or_default();

        let result = self.client.list_endpoints(namespace, &selector).await;
        let Some(endpoints) = self.absorb("endpoints", result) else {
            return;
        };

        self.sink.gauge(
            &format!("svc.{}", qualified_name(&svc.metadata)),
            endpoint_address_count(&endpoints),
        );
    }

    /// Node status gauges, then the pod count query that depends on this
    /// cycle's address map.
    async fn poll_nodes(&self) {
        debug!("polling nodes");
        let result = self.client.list_nodes().await;
        let Some(nodes) = self.absorb("nodes", result) else {
            return;
        };

        let counts = count_node_status(&nodes);
        self.sink.gauge("nodes.status.ready", counts.ready);
        self.sink.gauge("nodes.status.notready", counts.notready);
        self.sink.gauge("nodes.status.unknown", counts.unknown);

        let names = address_map(&nodes);
        self.poll_pods(&names).await;
    }

    async fn poll_pods(&self, names: &HashMap<String, String>) {
        let result = self.client.list_pods().await;
        let Some(pods) = self.absorb("pods", result) else {
            return;
        };

        for (name, count) in pods_per_node(&pods, names) {
            self.sink.gauge(&format!("nodes.pods.{name}"), count);
        }
    }
}
