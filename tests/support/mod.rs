//! In-memory cluster used by the integration tests in place of a real api server.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use k8s_openapi::api::core::v1::{
    EndpointAddress, EndpointSubset, Endpoints, Event, EventSource, Node, NodeAddress,
    NodeCondition, NodeStatus, ObjectReference, Pod, PodStatus, ReplicationController,
    ReplicationControllerSpec, Service, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::WatchEvent;
use kubestats::error::{Error, Result};
use kubestats::k8s::{ResourceClient, Subscription};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// What a list call answers with
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Items(Vec<T>),
    /// The request was made and failed
    QueryFails,
    /// No client could be built
    ConnectFails,
    /// The request never completes
    Hang,
}

impl<T> Default for Reply<T> {
    fn default() -> Self {
        Self::Items(Vec::new())
    }
}

impl<T: Clone> Reply<T> {
    async fn get(&self, what: &str) -> Result<Vec<T>> {
        match self {
            Self::Items(items) => Ok(items.clone()),
            Self::QueryFails => Err(Error::Custom(format!("{what}: 500 internal error"))),
            Self::ConnectFails => Err(Error::Connect(format!("{what}: connection refused"))),
            Self::Hang => futures::future::pending().await,
        }
    }
}

/// One scripted answer to `watch_events`
pub enum WatchReply {
    Fail,
    /// Deliver these items, then close
    Deliver(Vec<Result<WatchEvent<Event>>>),
    /// Deliver these items, then stay open
    DeliverAndHold(Vec<Result<WatchEvent<Event>>>),
}

#[derive(Default)]
pub struct FakeCluster {
    pub controllers: Reply<ReplicationController>,
    pub services: Reply<Service>,
    /// keyed by (namespace, label selector)
    pub endpoints: HashMap<(String, String), Reply<Endpoints>>,
    pub nodes: Reply<Node>,
    pub pods: Reply<Pod>,
    /// consumed front to back; once empty every watch succeeds and stays open silently
    pub watch_script: Mutex<VecDeque<WatchReply>>,
    pub watch_attempts: Mutex<Vec<Instant>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn script_watch(&self, replies: Vec<WatchReply>) {
        self.watch_script.lock().unwrap().extend(replies);
    }

    pub fn watch_attempts(&self) -> Vec<Instant> {
        self.watch_attempts.lock().unwrap().clone()
    }

    pub fn calls_to(&self, what: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == what).count()
    }

    fn record(&self, what: &str) {
        self.calls.lock().unwrap().push(what.to_string());
    }
}

#[async_trait]
impl ResourceClient for FakeCluster {
    async fn list_replication_controllers(&self) -> Result<Vec<ReplicationController>> {
        self.record("controllers");
        self.controllers.get("controllers").await
    }

    async fn list_services(&self) -> Result<Vec<Service>> {
        self.record("services");
        self.services.get("services").await
    }

    async fn list_endpoints(&self, namespace: &str, selector: &str) -> Result<Vec<Endpoints>> {
        self.record("endpoints");
        self.endpoints
            .get(&(namespace.to_string(), selector.to_string()))
            .cloned()
            .unwrap_or_default()
            .get("endpoints")
            .await
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.record("nodes");
        self.nodes.get("nodes").await
    }

    async fn list_pods(&self) -> Result<Vec<Pod>> {
        self.record("pods");
        self.pods.get("pods").await
    }

    async fn watch_events(&self) -> Result<Subscription> {
        self.watch_attempts.lock().unwrap().push(Instant::now());
        let reply = self.watch_script.lock().unwrap().pop_front();
        match reply {
            Some(WatchReply::Fail) => Err(Error::Custom("watch: 503 unavailable".to_string())),
            Some(WatchReply::Deliver(items)) => Ok(Subscription::new(futures::stream::iter(items))),
            Some(WatchReply::DeliverAndHold(items)) => {
                use futures::StreamExt;
                Ok(Subscription::new(
                    futures::stream::iter(items)
                        .chain(futures::stream::pending::<Result<WatchEvent<Event>>>()),
                ))
            }
            None => Ok(Subscription::new(futures::stream::pending::<
                Result<WatchEvent<Event>>,
            >())),
        }
    }
}

pub fn meta(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        namespace: Some(namespace.to_string()),
        name: Some(name.to_string()),
        ..ObjectMeta::default()
    }
}

pub fn controller(namespace: &str, name: &str, replicas: i32) -> ReplicationController {
    ReplicationController {
        metadata: meta(namespace, name),
        spec: Some(ReplicationControllerSpec {
            replicas: Some(replicas),
            ..ReplicationControllerSpec::default()
        }),
        ..ReplicationController::default()
    }
}

pub fn service(namespace: &str, name: &str, selector: &[(&str, &str)]) -> Service {
    let selector: BTreeMap<String, String> = selector
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    Service {
        metadata: meta(namespace, name),
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

/// Endpoints with one subset per entry of `subset_sizes`
pub fn endpoints(subset_sizes: &[usize]) -> Endpoints {
    Endpoints {
        subsets: Some(
            subset_sizes
                .iter()
                .map(|n| EndpointSubset {
                    addresses: Some(vec![EndpointAddress::default(); *n]),
                    ..EndpointSubset::default()
                })
                .collect(),
        ),
        ..Endpoints::default()
    }
}

/// `ready` is the status of the Ready condition, `None` for no condition at all
pub fn node(name: &str, address: &str, ready: Option<&str>) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..ObjectMeta::default()
        },
        status: Some(NodeStatus {
            addresses: Some(vec![NodeAddress {
                address: address.to_string(),
                type_: "InternalIP".to_string(),
            }]),
            conditions: ready.map(|status| {
                vec![NodeCondition {
                    type_: "Ready".to_string(),
                    status: status.to_string(),
                    ..NodeCondition::default()
                }]
            }),
            ..NodeStatus::default()
        }),
        ..Node::default()
    }
}

pub fn pod_on(host_ip: &str) -> Pod {
    Pod {
        status: Some(PodStatus {
            host_ip: Some(host_ip.to_string()),
            ..PodStatus::default()
        }),
        ..Pod::default()
    }
}

/// An event from `source` about an object of `kind`, last seen `age` ago
pub fn event(source: &str, kind: &str, reason: &str, age: TimeDelta) -> WatchEvent<Event> {
    WatchEvent::Added(Event {
        reason: Some(reason.to_string()),
        count: Some(1),
        last_timestamp: Some(Time(Utc::now() - age)),
        message: Some(format!("{reason} happened")),
        source: Some(EventSource {
            component: Some(source.to_string()),
            host: None,
        }),
        involved_object: ObjectReference {
            kind: Some(kind.to_string()),
            namespace: Some("shop".to_string()),
            name: Some("web-1".to_string()),
            ..ObjectReference::default()
        },
        ..Event::default()
    })
}

/// Poll `condition` every 10ms (of tokio time) until it holds or `limit` passes
pub async fn eventually(limit: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
