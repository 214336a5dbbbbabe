/**
 * Event watch supervisor
 *
 * Keeps exactly one subscription to the cluster event feed open for as long as
 * the exporter runs. Acquisition is tried immediately, then every
 * `retry_backoff` until it succeeds. A closed subscription is replaced with a
 * brand-new one; nothing is resumed or replayed.
 */
use super::classifier::EventClassifier;
use crate::config::{ERROR_COUNTER, ExporterConfig};
use crate::k8s::resources::{ResourceClient, Subscription};
use crate::metrics::MetricsSink;
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How a connected phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disconnect {
    /// The feed closed or broke; acquire a new subscription
    Closed,
    Cancelled,
}

pub struct WatchSupervisor {
    config: Arc<ExporterConfig>,
    client: Arc<dyn ResourceClient>,
    sink: Arc<dyn MetricsSink>,
    classifier: EventClassifier,
}

impl WatchSupervisor {
    #[must_use]
    pub fn new(
        config: Arc<ExporterConfig>,
        client: Arc<dyn ResourceClient>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        let classifier = EventClassifier::new(config.clone(), sink.clone());
        Self {
            config,
            client,
            sink,
            classifier,
        }
    }

    /// Acquire, consume, and re-acquire until `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        info!("🔍 Starting event watcher");

        while let Some(mut subscription) = self.acquire(&token).await {
            debug!("watch acquired");
            if self.consume(&mut subscription, &token).await == Disconnect::Cancelled {
                break;
            }
        }

        info!("🔍 Event watcher cancelled");
    }

    /// Try once, then retry every `retry_backoff` forever.
    /// Returns `None` only when cancelled.
    async fn acquire(&self, token: &CancellationToken) -> Option<Subscription> {
        if let Some(subscription) = self.attempt(token).await? {
            return Some(subscription);
        }

        loop {
            debug!("watch acquisition retrying in {:?}", self.config.retry_backoff);
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    debug!("watch acquisition cancelled");
                    return None;
                }
                () = sleep(self.config.retry_backoff) => {}
            }

            if let Some(subscription) = self.attempt(token).await? {
                return Some(subscription);
            }
        }
    }

    /// A single acquisition attempt. The outer `None` means cancelled, the
    /// inner `None` means this attempt failed.
    async fn attempt(&self, token: &CancellationToken) -> Option<Option<Subscription>> {
        let result = tokio::select! {
            biased;
            () = token.cancelled() => return None,
            result = self.client.watch_events() => result,
        };

        match result {
            Ok(subscription) => Some(Some(subscription)),
            Err(e) if e.is_connection() => {
                debug!("watch client not created: {}", e);
                Some(None)
            }
            Err(e) => {
                debug!("event watch returned error: {}", e);
                self.sink.incr(ERROR_COUNTER);
                Some(None)
            }
        }
    }

    /// Feed events to the classifier in delivery order until the
    /// subscription closes or `token` is cancelled.
    async fn consume(
        &self,
        subscription: &mut Subscription,
        token: &CancellationToken,
    ) -> Disconnect {
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    subscription.stop();
                    return Disconnect::Cancelled;
                }
                item = subscription.next() => match item {
                    Some(Ok(event)) => {
                        self.classifier.handle(event);
                    }
                    Some(Err(e)) => {
                        debug!("event watch stream failed: {}", e);
                        self.sink.incr(ERROR_COUNTER);
                        subscription.stop();
                        return Disconnect::Closed;
                    }
                    None => {
                        debug!("event watch closed, reacquiring");
                        return Disconnect::Closed;
                    }
                }
            }
        }
    }
}
