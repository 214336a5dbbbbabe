mod support;

use kubestats::config::ExporterConfig;
use kubestats::exporter::Exporter;
use kubestats::metrics::RecordingSink;
use std::sync::Arc;
use std::time::Duration;
use support::{FakeCluster, Reply, eventually, node};

fn cluster() -> Arc<FakeCluster> {
    Arc::new(FakeCluster {
        nodes: Reply::Items(vec![node("node-a", "10.0.0.1", Some("True"))]),
        ..FakeCluster::default()
    })
}

#[tokio::test]
async fn test_start_polls_eagerly_and_drains_on_cancel() {
    let cluster = cluster();
    let sink = Arc::new(RecordingSink::new());
    let config = Arc::new(ExporterConfig::default());

    let handle = Exporter::start(config.clone(), cluster.clone(), sink.clone());

    // first poll happens at startup, long before the 60s interval
    assert!(
        eventually(Duration::from_secs(2), || {
            sink.gauge_value("nodes.status.ready") == Some(1)
        })
        .await
    );
    assert!(eventually(Duration::from_secs(2), || cluster.watch_attempts().len() == 1).await);

    handle.cancel();
    handle.cancel();
    assert!(handle.drain(config.shutdown_grace).await);
}

#[tokio::test(start_paused = true)]
async fn test_polls_on_every_tick_until_cancelled() {
    let cluster = cluster();
    let sink = Arc::new(RecordingSink::new());
    let config = Arc::new(ExporterConfig {
        interval: Duration::from_secs(60),
        ..ExporterConfig::default()
    });

    let handle = Exporter::start(config.clone(), cluster.clone(), sink.clone());

    assert!(eventually(Duration::from_secs(1), || cluster.calls_to("nodes") == 1).await);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(eventually(Duration::from_secs(1), || cluster.calls_to("nodes") == 2).await);

    handle.cancel();
    assert!(handle.drain(config.shutdown_grace).await);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(cluster.calls_to("nodes"), 2);
    assert_eq!(cluster.watch_attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_an_in_flight_cycle() {
    let cluster = Arc::new(FakeCluster {
        nodes: Reply::Hang,
        ..FakeCluster::default()
    });
    let sink = Arc::new(RecordingSink::new());
    let config = Arc::new(ExporterConfig::default());

    let handle = Exporter::start(config.clone(), cluster.clone(), sink.clone());

    // the node list never answers, so the first cycle is still running
    assert!(eventually(Duration::from_secs(1), || cluster.calls_to("nodes") == 1).await);

    handle.cancel();
    assert!(handle.drain(config.shutdown_grace).await);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(cluster.calls_to("nodes"), 1);
    assert_eq!(cluster.calls_to("pods"), 0);
    assert!(sink.gauge_value("nodes.status.ready").is_none());
}
