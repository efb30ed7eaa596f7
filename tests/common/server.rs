//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own database directory, task
//! queue workers and file cache.

use super::constants::*;
use super::fixtures::{open_test_services, TestServices};
use siteworks_server::server::{make_app, ServerConfig};
use siteworks_server::{AppConfig, AppServices, RequestsLoggingLevel, TaskQueueOptions, TaskQueueRunner};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Test server instance with isolated stores.
///
/// When dropped, the server and its queue workers shut down and the temporary
/// directory is removed.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    pub port: u16,

    /// Services shared with the running server, for direct store access in tests
    pub services: Arc<AppServices>,

    pub config: AppConfig,

    _fixture: TestServices,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    workers_shutdown: CancellationToken,
}

impl TestServer {
    /// Spawns a new test server on a random port, with queue workers running.
    ///
    /// # Panics
    ///
    /// Panics if the fixtures cannot be created, the port cannot be bound or
    /// the server does not become ready in time.
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let fixture =
            open_test_services(Some(base_url.clone())).expect("Failed to open test services");
        let services = fixture.services.clone();
        let config = fixture.config.clone();

        let server_config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            port,
            files_dir: Some(config.files_dir.clone()),
        };
        let app = make_app(server_config, services.clone());

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let workers_shutdown = CancellationToken::new();
        let runner = Arc::new(TaskQueueRunner::new(
            services.clone(),
            TaskQueueOptions {
                max_concurrent: config.task_queue.max_concurrent,
                poll_interval: Duration::from_millis(TASK_POLL_INTERVAL_MS),
                unstuck_after: Duration::from_secs(config.task_queue.unstuck_after_secs),
            },
        ));
        tokio::spawn(runner.run_workers(workers_shutdown.clone()));

        let server = Self {
            base_url,
            port,
            services,
            config,
            _fixture: fixture,
            _shutdown_tx: Some(shutdown_tx),
            workers_shutdown,
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the status endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.workers_shutdown.cancel();
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
