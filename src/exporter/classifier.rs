//! Filters and scores cluster change events as they arrive from the watch.
//!
//! A freshly opened watch replays recent history before it delivers anything
//! new. Events last seen more than the freshness window ago are treated as
//! that backlog and dropped without being counted.
use crate::config::ExporterConfig;
use crate::metrics::MetricsSink;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Event;
use kube::api::WatchEvent;
use std::sync::Arc;
use tracing::{debug, warn};

/// The parts of a cluster event the exporter reports on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub source: String,
    pub reason: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    /// Times the event has occurred, at least 1
    pub count: u32,
    pub last_seen: DateTime<Utc>,
    pub message: String,
}

impl ChangeEvent {
    /// Extract a `ChangeEvent`; `None` when the event carries no usable timestamp.
    #[must_use]
    pub fn from_event(event: &Event) -> Option<Self> {
        let last_seen = event
            .last_timestamp
            .as_ref()
            .map(|t| t.0)
            .or_else(|| event.event_time.as_ref().map(|t| t.0))?;

        let source = event
            .source
            .as_ref()
            .and_then(|s| s.component.clone())
            .filter(|c| !c.is_empty())
            .or_else(|| event.reporting_component.clone())
            .unwrap_or_default();

        let involved = &event.involved_object;
        let count = event
            .count
            .and_then(|c| u32::try_from(c).ok())
            .unwrap_or(1)
            .max(1);

        Some(Self {
            source,
            reason: event.reason.clone().unwrap_or_default(),
            kind: involved.kind.clone().unwrap_or_default(),
            namespace: involved.namespace.clone().unwrap_or_default(),
            name: involved.name.clone().unwrap_or_default(),
            count,
            last_seen,
            message: event.message.as_deref().unwrap_or_default().trim().to_string(),
        })
    }

    /// `event.<source>.<kind>.<reason>`
    #[must_use]
    pub fn counter_name(&self) -> String {
        format!("event.{}.{}.{}", self.source, self.kind, self.reason)
    }
}

/// What happens to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Stale or unreadable; not logged above debug, not counted
    Drop,
    /// Counted, logged at debug
    Quiet,
    /// Counted, always logged
    Loud,
}

pub struct EventClassifier {
    config: Arc<ExporterConfig>,
    sink: Arc<dyn MetricsSink>,
}

impl EventClassifier {
    #[must_use]
    pub fn new(config: Arc<ExporterConfig>, sink: Arc<dyn MetricsSink>) -> Self {
        Self { config, sink }
    }

    /// Decide what to do with `event` as of `now`. Has no side effects.
    #[must_use]
    pub fn classify(&self, event: &ChangeEvent, now: DateTime<Utc>) -> Verdict {
        // a negative age (clock skew) fails to_std and counts as fresh
        let stale = (now - event.last_seen)
            .to_std()
            .is_ok_and(|age| age > self.config.freshness_window);

        if stale {
            Verdict::Drop
        } else if event.reason == self.config.failure_reason {
            Verdict::Loud
        } else {
            Verdict::Quiet
        }
    }

    /// Classify a raw watch item against the current time, log it and count it.
    pub fn handle(&self, watch_event: WatchEvent<Event>) -> Verdict {
        self.handle_at(watch_event, Utc::now())
    }

    pub fn handle_at(&self, watch_event: WatchEvent<Event>, now: DateTime<Utc>) -> Verdict {
        let event = match watch_event {
            WatchEvent::Added(e) | WatchEvent::Modified(e) | WatchEvent::Deleted(e) => e,
            WatchEvent::Bookmark(_) => return Verdict::Drop,
            WatchEvent::Error(e) => {
                debug!("discarding watch error payload: {} ({})", e.message, e.code);
                return Verdict::Drop;
            }
        };
        let Some(change) = ChangeEvent::from_event(&event) else {
            debug!("discarding event without a timestamp");
            return Verdict::Drop;
        };

        let verdict = self.classify(&change, now);
        match verdict {
            Verdict::Drop => {
                debug!(
                    "ignoring old event: {} {:?} {} {}/{} from {}: {}",
                    change.source,
                    change.reason,
                    change.kind,
                    change.namespace,
                    change.name,
                    change.last_seen,
                    change.message
                );
                return verdict;
            }
            Verdict::Loud => {
                warn!(
                    "⚠️  Received event: {} {:?} {} {}/{}: {}",
                    change.source,
                    change.reason,
                    change.kind,
                    change.namespace,
                    change.name,
                    change.message
                );
            }
            Verdict::Quiet => {
                let repeats = if change.count > 1 {
                    format!(" (x{})", change.count)
                } else {
                    String::new()
                };
                debug!(
                    "Received event: {} {:?} {} {}/{}{}: {}",
                    change.source,
                    change.reason,
                    change.kind,
                    change.namespace,
                    change.name,
                    repeats,
                    change.message
                );
            }
        }

        self.sink.incr(&change.counter_name());
        verdict
    }
}
