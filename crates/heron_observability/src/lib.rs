//! Observability setup: structured logging and Prometheus metrics.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with structured logging.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,heron=debug"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Initialize the Prometheus metrics exporter on `listen_addr`.
pub fn init_metrics(listen_addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let addr: std::net::SocketAddr = listen_addr.parse()?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("Prometheus metrics endpoint on http://{}/metrics", addr);
    Ok(())
}

// ---------------------------------------------------------------------------
// Site metrics
// ---------------------------------------------------------------------------

/// Record the current depth of one partition's task queue.
pub fn record_site_queue_depth(partition: u32, depth: usize) {
    metrics::gauge!("heron_site_queue_depth", "partition" => partition.to_string())
        .set(depth as f64);
}

/// Record site runner counters from a metrics snapshot.
pub fn record_site_runner(
    partition: u32,
    tasks_run: u64,
    tasks_replayed: u64,
    task_failures: u64,
) {
    let p = partition.to_string();
    metrics::gauge!("heron_site_tasks_run", "partition" => p.clone()).set(tasks_run as f64);
    metrics::gauge!("heron_site_tasks_replayed", "partition" => p.clone())
        .set(tasks_replayed as f64);
    metrics::gauge!("heron_site_task_failures", "partition" => p).set(task_failures as f64);
}

// ---------------------------------------------------------------------------
// DR apply metrics
// ---------------------------------------------------------------------------

/// Record one classified delivery. `outcome` is the classification label
/// ("success", "duplicate", "gap", "ambiguous").
pub fn record_dr_delivery(outcome: &str) {
    metrics::counter!("heron_dr_deliveries_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record the number of tracked (cluster, partition) pairs.
pub fn record_dr_tracked_pairs(count: usize) {
    metrics::gauge!("heron_dr_tracked_pairs").set(count as f64);
}
