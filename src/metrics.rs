//! Metrics sinks: where gauges and counters derived from cluster state go.
//!
//! Emission is fire-and-forget. A sink never reports failure back to the
//! caller; delivery problems are logged and otherwise ignored.
use crate::error::Result;
use cadence::{Counted, Gauged, QueuingMetricSink, StatsdClient, UdpMetricSink};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Mutex;
use tracing::{debug, info};

/// Capability to emit metrics, injected into every component that reports.
pub trait MetricsSink: Send + Sync {
    /// Set a point-in-time value.
    fn gauge(&self, name: &str, value: i64);

    /// Add `delta` to an accumulating value.
    fn counter(&self, name: &str, delta: i64);

    fn incr(&self, name: &str) {
        self.counter(name, 1);
    }
}

/// Sends metrics to a statsd agent through a cadence client.
///
/// Emission only enqueues the metric; cadence's queuing sink writes it out on
/// its own thread over a non-blocking UDP socket.
pub struct StatsdSink {
    client: StatsdClient,
}

impl StatsdSink {
    /// Resolve `addr` and build a queuing UDP client that prefixes every metric
    ///
    /// # Errors
    ///
    /// Will return `Err` if the address does not resolve or no socket can be bound
    pub fn new(addr: &str, prefix: &str) -> Result<Self> {
        let target = addr.to_socket_addrs()?.next().ok_or_else(|| {
            crate::error::Error::Custom(format!("statsd address {addr} did not resolve"))
        })?;
        let local = if target.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;

        let udp_sink = UdpMetricSink::from(target, socket)?;
        let client = StatsdClient::from_sink(
            prefix.trim_end_matches('.'),
            QueuingMetricSink::from(udp_sink),
        );
        debug!("statsd sink sending to {} ({})", addr, target);

        Ok(Self { client })
    }
}

impl MetricsSink for StatsdSink {
    fn gauge(&self, name: &str, value: i64) {
        // gauges here are object counts and never negative
        let value = u64::try_from(value).unwrap_or(0);
        if let Err(e) = self.client.gauge(name, value) {
            debug!("statsd gauge {} failed: {}", name, e);
        }
    }

    fn counter(&self, name: &str, delta: i64) {
        if let Err(e) = self.client.count(name, delta) {
            debug!("statsd counter {} failed: {}", name, e);
        }
    }
}

/// Writes every emission to the log instead of a metrics agent (`--dry-run`).
#[derive(Debug, Default)]
pub struct LogSink {
    prefix: String,
}

impl LogSink {
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches('.').to_string(),
        }
    }
}

impl MetricsSink for LogSink {
    fn gauge(&self, name: &str, value: i64) {
        info!(prefix = %self.prefix, "📈 gauge {} = {}", name, value);
    }

    fn counter(&self, name: &str, delta: i64) {
        info!(prefix = %self.prefix, "📈 counter {} += {}", name, delta);
    }
}

/// A single recorded emission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    Gauge(String, i64),
    Counter(String, i64),
}

#[derive(Debug, Default)]
struct Recorded {
    gauges: BTreeMap<String, i64>,
    counters: BTreeMap<String, i64>,
    log: Vec<Emission>,
}

/// Keeps emissions in memory so tests can assert on (name, value) pairs.
///
/// Gauges keep their last value, counters accumulate.
#[derive(Debug, Default)]
pub struct RecordingSink {
    recorded: Mutex<Recorded>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn gauge_value(&self, name: &str) -> Option<i64> {
        self.recorded
            .lock()
            .ok()
            .and_then(|r| r.gauges.get(name).copied())
    }

    /// Accumulated counter value, 0 if never incremented
    #[must_use]
    pub fn counter_value(&self, name: &str) -> i64 {
        self.recorded
            .lock()
            .map_or(0, |r| r.counters.get(name).copied().unwrap_or(0))
    }

    #[must_use]
    pub fn gauges(&self) -> BTreeMap<String, i64> {
        self.recorded
            .lock()
            .map_or_else(|_| BTreeMap::new(), |r| r.gauges.clone())
    }

    #[must_use]
    pub fn counters(&self) -> BTreeMap<String, i64> {
        self.recorded
            .lock()
            .map_or_else(|_| BTreeMap::new(), |r| r.counters.clone())
    }

    /// Every emission in the order it happened
    #[must_use]
    pub fn emissions(&self) -> Vec<Emission> {
        self.recorded
            .lock()
            .map_or_else(|_| Vec::new(), |r| r.log.clone())
    }
}

impl MetricsSink for RecordingSink {
    fn gauge(&self, name: &str, value: i64) {
        if let Ok(mut r) = self.recorded.lock() {
            r.gauges.insert(name.to_string(), value);
            r.log.push(Emission::Gauge(name.to_string(), value));
        }
    }

    fn counter(&self, name: &str, delta: i64) {
        if let Ok(mut r) = self.recorded.lock() {
            *r.counters.entry(name.to_string()).or_insert(0) += delta;
            r.log.push(Emission::Counter(name.to_string(), delta));
        }
    }
}
