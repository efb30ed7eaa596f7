use super::state::GuardedAppServices;
use crate::tasks::{TaskError, TaskParams};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::error;

use super::state::ServerState;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

async fn list_tasks(State(services): State<GuardedAppServices>) -> Response {
    Json(services.registry.descriptors()).into_response()
}

/// The body, when present, is a JSON object of string parameters.
async fn enqueue_task(
    State(services): State<GuardedAppServices>,
    Path(alias): Path<String>,
    body: Bytes,
) -> Response {
    let params = if body.iter().all(u8::is_ascii_whitespace) {
        TaskParams::new()
    } else {
        match serde_json::from_slice::<HashMap<String, String>>(&body) {
            Ok(map) => TaskParams::from(map),
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("invalid task parameters: {}", e),
                )
            }
        }
    };

    let result = tokio::task::spawn_blocking(move || services.enqueue_task(&alias, params)).await;
    match result {
        Ok(Ok(task)) => (StatusCode::CREATED, Json(task)).into_response(),
        Ok(Err(e @ TaskError::UnknownAlias(_))) => {
            error_response(StatusCode::NOT_FOUND, e.to_string())
        }
        Ok(Err(e @ TaskError::NotConfigured)) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        Ok(Err(e)) => {
            error!("Failed to enqueue task: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            error!("Enqueue worker failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_queued_task(
    State(services): State<GuardedAppServices>,
    Path(id): Path<String>,
) -> Response {
    let Some(store) = services.task_store.clone() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            TaskError::NotConfigured.to_string(),
        );
    };
    match tokio::task::spawn_blocking(move || store.find_by_id(&id)).await {
        Ok(Ok(Some(task))) => Json(task).into_response(),
        Ok(Ok(None)) => StatusCode::NOT_FOUND.into_response(),
        Ok(Err(e)) => {
            error!("Failed to read queued task: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            error!("Queue lookup worker failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn make_task_routes(state: ServerState) -> Router {
    Router::new()
        .route("/tasks", get(list_tasks))
        .route("/tasks/{alias}", post(enqueue_task))
        .route("/queue/{id}", get(get_queued_task))
        .with_state(state)
}
