use anyhow::Context;
use clap::Parser;
use kubestats::config::{
    DEFAULT_INTERVAL_SECONDS, DEFAULT_STATSD_ADDR, DEFAULT_STATSD_PREFIX, ExporterConfig,
};
use kubestats::exporter::Exporter;
use kubestats::k8s::{KubeResourceClient, ResourceClient};
use kubestats::metrics::{LogSink, MetricsSink, StatsdSink};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Debug logging
    #[arg(long)]
    debug: bool,

    /// Statsd agent address
    #[arg(long, default_value = DEFAULT_STATSD_ADDR)]
    statsd_addr: String,

    /// Prefix for every metric name
    #[arg(long, default_value = DEFAULT_STATSD_PREFIX)]
    statsd_prefix: String,

    /// Kubernetes api address, e.g. http://localhost:8080. Inferred from kubeconfig when omitted
    #[arg(long)]
    kube_addr: Option<String>,

    /// Seconds between polls of the api
    #[arg(long, default_value_t = DEFAULT_INTERVAL_SECONDS)]
    interval: u64,

    /// Log metrics instead of sending them to statsd
    #[arg(long)]
    dry_run: bool,
}

impl Args {
    fn into_config(self) -> ExporterConfig {
        ExporterConfig {
            interval: Duration::from_secs(self.interval),
            kube_addr: self.kube_addr,
            statsd_addr: self.statsd_addr,
            statsd_prefix: self.statsd_prefix,
            debug: self.debug,
            ..ExporterConfig::default()
        }
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "kubestats=debug" } else { "kubestats=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[cfg(unix)]
async fn terminated() -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn terminated() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let dry_run = args.dry_run;
    let config = args.into_config();
    init_tracing(config.debug);
    config.validate()?;

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    info!("Polling kubernetes API every {:?}", config.interval);
    info!("Using {} as kubernetes API", config.kube_addr_display());
    info!("Using {} as statsd prefix", config.statsd_prefix);

    let sink: Arc<dyn MetricsSink> = if dry_run {
        Arc::new(LogSink::new(&config.statsd_prefix))
    } else {
        Arc::new(
            StatsdSink::new(&config.statsd_addr, &config.statsd_prefix)
                .with_context(|| format!("connecting to statsd at {}", config.statsd_addr))?,
        )
    };
    let client: Arc<dyn ResourceClient> =
        Arc::new(KubeResourceClient::new(config.kube_addr.clone()));

    let config = Arc::new(config);
    let handle = Exporter::start(config.clone(), client, sink);

    terminated().await?;
    info!("Stopping.");
    handle.cancel();
    handle.drain(config.shutdown_grace).await;

    Ok(())
}
