/**
Exporter lifecycle

Starts the event watch supervisor and the poller as independent tasks that
share one cancellation token, and hands back the handle that stops them.
*/
pub mod classifier;
pub mod poller;
pub mod watcher;

use crate::config::ExporterConfig;
use crate::k8s::resources::ResourceClient;
use crate::metrics::MetricsSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use classifier::{ChangeEvent, EventClassifier, Verdict};
pub use poller::PollOrchestrator;
pub use watcher::WatchSupervisor;

pub struct Exporter;

impl Exporter {
    /// Spawn the watch supervisor and the poller. Must be called from within a
    /// tokio runtime.
    #[must_use]
    pub fn start(
        config: Arc<ExporterConfig>,
        client: Arc<dyn ResourceClient>,
        sink: Arc<dyn MetricsSink>,
    ) -> ShutdownHandle {
        let token = CancellationToken::new();

        let supervisor = WatchSupervisor::new(config.clone(), client.clone(), sink.clone());
        let watch_token = token.clone();
        let watch_handle = tokio::spawn(async move {
            supervisor.run(watch_token).await;
        });

        let poller = PollOrchestrator::new(config, client, sink);
        let poll_token = token.clone();
        let poll_handle = tokio::spawn(async move {
            poller.run(poll_token).await;
        });

        info!("🚀 Exporter started");

        ShutdownHandle {
            token,
            task_handles: vec![watch_handle, poll_handle],
        }
    }
}

/// Handle to stop the exporter's tasks
pub struct ShutdownHandle {
    token: CancellationToken,
    task_handles: Vec<JoinHandle<()>>,
}

impl ShutdownHandle {
    /// Signal every task to stop. Safe to call more than once.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Give the tasks up to `grace` to observe cancellation and finish.
    /// Tasks still running after that are abandoned. Returns true if every
    /// task finished in time.
    pub async fn drain(self, grace: Duration) -> bool {
        let finished =
            tokio::time::timeout(grace, futures::future::join_all(self.task_handles)).await;
        match finished {
            Ok(_) => {
                debug!("all exporter tasks stopped");
                true
            }
            Err(_) => {
                debug!("exporter tasks still running after {:?}, abandoning", grace);
                false
            }
        }
    }
}
