use clap::Parser;
use netaware_scheduler::{
    pod_queue, run_node_watch, run_pod_watch, KubeClusterClient, NodeRegistry, PodAdmission,
    Scheduler, SchedulerConfig, DEFAULT_QUEUE_CAPACITY, SCHEDULER_NAME,
};
use netaware_telemetry::{CollectorConfig, HttpTelemetrySource, TargetConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long the watch tasks get to stop after cancellation
const WATCH_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Time allowed for the bind and event writes of a decision, on top of the
/// telemetry deadline
const COMMIT_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "netaware", about = "Network-aware Kubernetes pod scheduler")]
struct Cli {
    /// Scheduler name pods must request in spec.schedulerName
    #[arg(long, env = "NETAWARE_SCHEDULER_NAME", default_value = SCHEDULER_NAME)]
    scheduler_name: String,
    /// Capacity of the pending pod queue
    #[arg(long, env = "NETAWARE_QUEUE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,
    /// Deadline for collecting one node's telemetry, in milliseconds
    #[arg(long, env = "NETAWARE_FETCH_TIMEOUT_MS", default_value_t = 5000)]
    fetch_timeout_ms: u64,
    /// Maximum number of nodes queried at the same time
    #[arg(long, env = "NETAWARE_MAX_CONCURRENT_FETCHES", default_value_t = 8)]
    max_concurrent_fetches: usize,
    /// Node exporter port used when a node has no metrics URL annotation
    #[arg(long, env = "NETAWARE_METRICS_PORT", default_value_t = 9100)]
    metrics_port: u16,
    /// Node exporter path used when a node has no metrics URL annotation
    #[arg(long, env = "NETAWARE_METRICS_PATH", default_value = "/metrics")]
    metrics_path: String,
    /// Directory holding <InternalIP>.json benchmark results
    #[arg(long, env = "NETAWARE_BENCHMARK_DIR", default_value = "/home")]
    benchmark_dir: PathBuf,
    /// Emit logs as JSON lines
    #[arg(long, env = "NETAWARE_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            scheduler_name: self.scheduler_name.clone(),
            targets: TargetConfig {
                metrics_port: self.metrics_port,
                metrics_path: self.metrics_path.clone(),
                benchmark_dir: self.benchmark_dir.clone(),
            },
            collector: CollectorConfig {
                fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
                max_concurrent_fetches: self.max_concurrent_fetches,
            },
            queue_capacity: self.queue_capacity,
        }
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    run(cli.scheduler_config()).await
}

/// Run the node watch, pod watch and scheduling loop until interrupted
async fn run(config: SchedulerConfig) -> miette::Result<()> {
    info!("Starting {}", config.scheduler_name);

    let client = kube::Client::try_default()
        .await
        .map_err(|e| miette::miette!("Failed to load cluster credentials: {}", e))?;

    let telemetry = Arc::new(HttpTelemetrySource::new(config.collector.fetch_timeout)?);
    let cluster = Arc::new(KubeClusterClient::new(client.clone()));

    let token = CancellationToken::new();

    // 1. Spawn node watch
    let (registry, writer) = NodeRegistry::new();
    let node_watch_handle = tokio::spawn(run_node_watch(client.clone(), writer, token.clone()));

    // 2. Spawn pod watch
    let (queue_tx, queue_rx) = pod_queue(config.queue_capacity);
    let admission = PodAdmission::new(&config.scheduler_name, queue_tx);
    let pod_watch_handle = tokio::spawn(run_pod_watch(client, admission, token.clone()));

    // 3. Spawn scheduling loop
    let scheduler_name = config.scheduler_name.clone();
    let scheduler_grace = decision_grace(&config.collector);
    let scheduler = Scheduler::new(config, registry, telemetry, cluster, queue_rx);
    let scheduler_handle = tokio::spawn(scheduler.run(token.clone()));

    info!("All components started, scheduling pods for {}", scheduler_name);

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| miette::miette!("Failed to listen for ctrl-c: {}", e))?;

    info!("Shutting down gracefully...");
    token.cancel();

    // A decision already under way runs to completion; the watches only
    // get the fixed timeout
    tokio::join!(
        join_task("Node watch", node_watch_handle, WATCH_SHUTDOWN_TIMEOUT),
        join_task("Pod watch", pod_watch_handle, WATCH_SHUTDOWN_TIMEOUT),
        join_task("Scheduler", scheduler_handle, scheduler_grace),
    );

    info!("Shutdown complete");

    Ok(())
}

/// Upper bound on finishing a decision that was already under way at shutdown
fn decision_grace(collector: &CollectorConfig) -> Duration {
    collector.fetch_timeout + COMMIT_GRACE
}

/// Wait for a task to stop, logging a panic or an overrun instead of
/// dropping it silently. Returns whether the task finished cleanly.
async fn join_task(name: &str, handle: JoinHandle<()>, limit: Duration) -> bool {
    let abort = handle.abort_handle();
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!("{} task failed: {}", name, e);
            false
        }
        Err(_) => {
            warn!("{} task did not stop within {:?}, aborting", name, limit);
            abort.abort();
            false
        }
    }
}
