//! Request logging middleware

use super::super::state::ServerState;
use crate::server::metrics::{categorize_endpoint, record_http_request};
use axum::extract::State;
use axum::{
    body::Body,
    http::{header, HeaderMap, Request, Response, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use std::time::Instant;
use tracing::{error, info};

#[derive(PartialEq, PartialOrd, Clone, Debug, Default, clap::ValueEnum)]
pub enum RequestsLoggingLevel {
    None,
    #[default]
    Path,
    Headers,
    Body,
}

impl std::fmt::Display for RequestsLoggingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

const MAX_LOGGABLE_BODY_LENGTH: usize = 1024;

fn content_length(headers: &HeaderMap) -> Result<usize, &'static str> {
    headers
        .get(header::CONTENT_LENGTH)
        .ok_or("Content-length not set.")?
        .to_str()
        .map_err(|_| "Could not get Content-length string value.")?
        .parse::<usize>()
        .map_err(|_| "Could not parse Content-length numeric value.")
}

fn is_image(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("image/"))
}

fn log_headers(label: &str, headers: &HeaderMap) {
    info!("  {} Headers:", label);
    for (name, value) in headers.iter() {
        info!("    {:?}: {:?}", name, value);
    }
}

/// Logs a small body and hands back an equivalent one. Large bodies are only measured.
async fn log_body(label: &str, headers: &HeaderMap, body: Body) -> Result<Body, axum::Error> {
    let size = match content_length(headers) {
        Ok(size) => size,
        Err(reason) => {
            info!("  {} Body: {}", label, reason);
            return Ok(body);
        }
    };
    if size >= MAX_LOGGABLE_BODY_LENGTH {
        info!(
            "  {} Body: Too big to log ({:#})",
            label,
            byte_unit::Byte::from(size)
        );
        return Ok(body);
    }
    let bytes = axum::body::to_bytes(body, size).await?;
    info!("  {} Body:\n{}", label, String::from_utf8_lossy(&bytes));
    Ok(Body::from(bytes))
}

fn internal_error() -> Response<Body> {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

/// Logs each request at the configured level and records it in the HTTP metrics.
pub async fn log_requests(
    State(state): State<ServerState>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let level = state.config.requests_logging_level.clone();
    let start = Instant::now();

    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    if level > RequestsLoggingLevel::None {
        info!(">>> {} {}", method, request.uri());
    }
    if level >= RequestsLoggingLevel::Headers {
        log_headers("Req", request.headers());
    }

    let request = if level >= RequestsLoggingLevel::Body {
        let (parts, body) = request.into_parts();
        match log_body("Req", &parts.headers, body).await {
            Ok(body) => Request::from_parts(parts, body),
            Err(err) => {
                error!("Failed to read request body: {:?}", err);
                return internal_error();
            }
        }
    } else {
        request
    };

    let response = next.run(request).await;

    if level >= RequestsLoggingLevel::Headers {
        log_headers("Resp", response.headers());
    }

    // Thumbnails are never dumped.
    let response = if level >= RequestsLoggingLevel::Body && !is_image(response.headers()) {
        let (parts, body) = response.into_parts();
        match log_body("Resp", &parts.headers, body).await {
            Ok(body) => Response::from_parts(parts, body),
            Err(err) => {
                error!("Failed to read response body: {:?}", err);
                return internal_error();
            }
        }
    } else {
        response
    };

    let status = response.status().as_u16();
    let duration = start.elapsed();
    if level > RequestsLoggingLevel::None {
        info!("<<< {} ({}ms)", status, duration.as_millis());
    }
    record_http_request(&method, categorize_endpoint(&path), status, duration);

    response
}
