/**
 * Configuration for the exporter: defaults plus the immutable runtime settings
 * shared by the poller, the watch supervisor and the event classifier.
 */
use crate::error::{Error, Result};
use std::time::Duration;

/// Default period between poll cycles in seconds
pub const DEFAULT_INTERVAL_SECONDS: u64 = 60;

/// Fixed wait between failed watch acquisition attempts in seconds
pub const RETRY_BACKOFF_SECONDS: u64 = 2;

/// Events last seen longer ago than this are treated as backlog and dropped
pub const FRESHNESS_WINDOW_SECONDS: u64 = 5;

/// Time allowed for tasks to observe cancellation before the process exits
pub const SHUTDOWN_GRACE_MILLIS: u64 = 100;

/// Server-side timeout for a single watch request (the server closes the stream after this)
pub const WATCH_TIMEOUT_SECONDS: u32 = 290;

/// Event reason that is always logged loudly
pub const DEFAULT_FAILURE_REASON: &str = "failed";

pub const DEFAULT_STATSD_ADDR: &str = "localhost:8125";
pub const DEFAULT_STATSD_PREFIX: &str = "kubernetes";

/// Counter incremented for every failed list or watch call
pub const ERROR_COUNTER: &str = "kubestats.errors";

/// Immutable exporter settings, resolved once before startup
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Period between poll cycles
    pub interval: Duration,
    /// Wait between watch acquisition attempts
    pub retry_backoff: Duration,
    /// Maximum age of an event that is still counted
    pub freshness_window: Duration,
    /// Event reason that gets loud logging
    pub failure_reason: String,
    /// Best-effort drain period after cancellation
    pub shutdown_grace: Duration,
    /// Api server address; inferred from kubeconfig / in-cluster env when absent
    pub kube_addr: Option<String>,
    pub statsd_addr: String,
    pub statsd_prefix: String,
    pub debug: bool,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECONDS),
            retry_backoff: Duration::from_secs(RETRY_BACKOFF_SECONDS),
            freshness_window: Duration::from_secs(FRESHNESS_WINDOW_SECONDS),
            failure_reason: DEFAULT_FAILURE_REASON.to_string(),
            shutdown_grace: Duration::from_millis(SHUTDOWN_GRACE_MILLIS),
            kube_addr: None,
            statsd_addr: DEFAULT_STATSD_ADDR.to_string(),
            statsd_prefix: DEFAULT_STATSD_PREFIX.to_string(),
            debug: false,
        }
    }
}

impl ExporterConfig {
    /// # Errors
    ///
    /// Returns `Err` if a period is zero, which would turn a timer into a busy loop
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::Custom("poll interval must be greater than 0".to_string()));
        }
        if self.retry_backoff.is_zero() {
            return Err(Error::Custom("retry backoff must be greater than 0".to_string()));
        }
        Ok(())
    }

    /// Human readable api address for startup logging
    #[must_use]
    pub fn kube_addr_display(&self) -> &str {
        self.kube_addr.as_deref().unwrap_or("<inferred from kubeconfig>")
    }
}

/// Validate configuration constants at compile time
const _: () = {
    assert!(DEFAULT_INTERVAL_SECONDS > 0, "DEFAULT_INTERVAL_SECONDS must be greater than 0");
    assert!(RETRY_BACKOFF_SECONDS > 0, "RETRY_BACKOFF_SECONDS must be greater than 0");
    assert!(FRESHNESS_WINDOW_SECONDS > 0, "FRESHNESS_WINDOW_SECONDS must be greater than 0");
    assert!(WATCH_TIMEOUT_SECONDS > 0, "WATCH_TIMEOUT_SECONDS must be greater than 0");
};
