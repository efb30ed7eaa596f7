use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing::info;

use super::task_routes::make_task_routes;
use super::thumbnail_routes::get_thumbnail;
use super::{log_requests, state::ServerState, ServerConfig};
use crate::app_services::AppServices;

/// One line of the route table printed by `routes list`.
pub struct RouteInfo {
    pub method: &'static str,
    pub path: &'static str,
    pub description: &'static str,
}

pub const ROUTES: &[RouteInfo] = &[
    RouteInfo {
        method: "GET",
        path: "/",
        description: "Server status",
    },
    RouteInfo {
        method: "GET",
        path: "/th/{extension}/{size}/{quality}/{*path}",
        description: "Resized image thumbnail",
    },
    RouteInfo {
        method: "GET",
        path: "/v1/tasks",
        description: "Registered task handlers",
    },
    RouteInfo {
        method: "POST",
        path: "/v1/tasks/{alias}",
        description: "Enqueue a task",
    },
    RouteInfo {
        method: "GET",
        path: "/v1/queue/{id}",
        description: "Queued task entry",
    },
    RouteInfo {
        method: "GET",
        path: "/files/{*path}",
        description: "Uploaded files",
    },
    RouteInfo {
        method: "GET",
        path: "/metrics",
        description: "Prometheus metrics (metrics port)",
    },
];

#[derive(Serialize)]
struct ServerStats {
    pub version: &'static str,
    pub uptime: String,
    pub hash: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        version: env!("CARGO_PKG_VERSION"),
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
    };
    Json(stats)
}

pub fn make_app(config: ServerConfig, services: Arc<AppServices>) -> Router {
    let state = ServerState::new(config.clone(), services);

    let mut app: Router = Router::new()
        .route("/", get(home))
        .route("/th/{extension}/{size}/{quality}/{*path}", get(get_thumbnail))
        .with_state(state.clone())
        .nest("/v1", make_task_routes(state.clone()));

    if let Some(files_dir) = &config.files_dir {
        app = app.nest_service("/files", ServeDir::new(files_dir));
    }

    app.layer(middleware::from_fn_with_state(state, log_requests))
}

/// Serve until `shutdown` is cancelled.
pub async fn run_server(
    config: ServerConfig,
    services: Arc<AppServices>,
    shutdown: CancellationToken,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, services);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind HTTP server on port {}", port))?;
    info!("HTTP server listening on port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("HTTP server stopped");
    Ok(())
}
