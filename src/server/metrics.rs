use crate::task_store::TaskStatus;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Metric name prefix for all siteworks metrics
const PREFIX: &str = "siteworks";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Task Queue Metrics
    pub static ref TASK_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_task_executions_total"), "Task executions by alias and final status"),
        &["alias", "status"]
    ).expect("Failed to create task_executions_total metric");

    pub static ref TASK_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_task_duration_seconds"),
            "Task execution duration in seconds"
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 60.0, 300.0]),
        &["alias"]
    ).expect("Failed to create task_duration_seconds metric");

    pub static ref TASK_CLAIMS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_task_claims_total"),
        "Queued entries claimed by a worker"
    ).expect("Failed to create task_claims_total metric");

    pub static ref TASKS_UNSTUCK_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_tasks_unstuck_total"),
        "Running entries failed by the unstuck loop"
    ).expect("Failed to create tasks_unstuck_total metric");

    // Schedule Metrics
    pub static ref SCHEDULED_JOB_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_scheduled_job_runs_total"), "Scheduled job runs by job and result"),
        &["job", "result"]
    ).expect("Failed to create scheduled_job_runs_total metric");

    pub static ref SCHEDULED_JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_scheduled_job_duration_seconds"),
            "Scheduled job duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.1, 1.0, 10.0]),
        &["job"]
    ).expect("Failed to create scheduled_job_duration_seconds metric");

    // Thumbnail Metrics
    pub static ref THUMBNAIL_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_thumbnail_requests_total"), "Thumbnail requests by cache result"),
        &["result"]
    ).expect("Failed to create thumbnail_requests_total metric");

    // Process Metrics
    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(TASK_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TASK_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(TASK_CLAIMS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TASKS_UNSTUCK_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SCHEDULED_JOB_RUNS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SCHEDULED_JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(THUMBNAIL_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Collapse variable path segments so label cardinality stays bounded.
pub fn categorize_endpoint(path: &str) -> &'static str {
    if path.starts_with("/th/") {
        "thumbnail"
    } else if path.starts_with("/files/") {
        "files"
    } else if path.starts_with("/v1/queue/") {
        "queue"
    } else if path.starts_with("/v1/tasks") {
        "tasks"
    } else if path == "/" {
        "status"
    } else {
        "other"
    }
}

pub fn record_task_claim() {
    TASK_CLAIMS_TOTAL.inc();
}

pub fn record_tasks_unstuck(count: usize) {
    if count > 0 {
        TASKS_UNSTUCK_TOTAL.inc_by(count as f64);
    }
}

/// Record a finished task execution
pub fn record_task_execution(alias: &str, status: TaskStatus, duration: Duration) {
    TASK_EXECUTIONS_TOTAL
        .with_label_values(&[alias, status.as_str()])
        .inc();

    TASK_DURATION_SECONDS
        .with_label_values(&[alias])
        .observe(duration.as_secs_f64());
}

/// Record a scheduled job run; `result` is one of success, skipped, failed, panic
pub fn record_scheduled_job_run(job: &str, result: &str, duration: Duration) {
    SCHEDULED_JOB_RUNS_TOTAL
        .with_label_values(&[job, result])
        .inc();

    SCHEDULED_JOB_DURATION_SECONDS
        .with_label_values(&[job])
        .observe(duration.as_secs_f64());
}

/// Record a thumbnail request; `result` is one of hit, miss, error
pub fn record_thumbnail_request(result: &str) {
    THUMBNAIL_REQUESTS_TOTAL.with_label_values(&[result]).inc();
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    // RSS is reported in kB
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<f64>() {
                            PROCESS_MEMORY_BYTES.set(kb * 1024.0);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Serve `/metrics` on its own port until `shutdown` is cancelled.
pub async fn run_metrics_server(port: u16, shutdown: CancellationToken) {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind metrics server on {}: {}", addr, e);
            return;
        }
    };
    info!("Metrics server listening on {}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
    {
        error!("Metrics server error: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric_exists(name: &str) -> bool {
        REGISTRY.gather().iter().any(|m| m.get_name() == name)
    }

    #[test]
    fn test_metrics_initialization() {
        init_metrics();

        let metric_families = REGISTRY.gather();
        assert!(!metric_families.is_empty(), "Metrics should be registered");
    }

    #[test]
    fn test_record_http_request() {
        init_metrics();

        record_http_request("GET", "thumbnail", 200, Duration::from_millis(50));

        assert!(metric_exists("siteworks_http_requests_total"));
    }

    #[test]
    fn test_record_task_execution() {
        init_metrics();

        record_task_claim();
        record_task_execution("HelloWorldTask", TaskStatus::Succeeded, Duration::from_millis(5));
        record_tasks_unstuck(2);

        assert!(metric_exists("siteworks_task_executions_total"));
        assert!(metric_exists("siteworks_task_duration_seconds"));
        assert!(TASKS_UNSTUCK_TOTAL.get() >= 2.0);
    }

    #[test]
    fn test_record_scheduled_job_and_thumbnail() {
        init_metrics();

        record_scheduled_job_run("clean_up", "success", Duration::from_millis(1));
        record_thumbnail_request("hit");

        assert!(metric_exists("siteworks_scheduled_job_runs_total"));
        assert!(metric_exists("siteworks_thumbnail_requests_total"));
    }

    #[test]
    fn test_categorize_endpoint() {
        assert_eq!(categorize_endpoint("/th/png/1x1/80/a.png"), "thumbnail");
        assert_eq!(categorize_endpoint("/files/a.png"), "files");
        assert_eq!(categorize_endpoint("/v1/queue/abc"), "queue");
        assert_eq!(categorize_endpoint("/v1/tasks/HelloWorldTask"), "tasks");
        assert_eq!(categorize_endpoint("/"), "status");
        assert_eq!(categorize_endpoint("/nope"), "other");
    }
}
