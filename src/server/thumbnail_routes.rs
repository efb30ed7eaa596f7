//! `GET /th/{extension}/{size}/{quality}/{*path}`
//!
//! Remote sources use `http/` and `https/` in place of the scheme because `://`
//! cannot be carried in a path segment: `/th/png/300x300/80/https/example.com/a.png`.

use super::metrics::record_thumbnail_request;
use super::state::GuardedThumbnailService;
use crate::thumbnail::{ThumbnailError, BROWSER_CACHE_CONTROL};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::debug;

pub async fn get_thumbnail(
    State(thumbnails): State<GuardedThumbnailService>,
    Path((extension, size, quality, path)): Path<(String, String, String, String)>,
) -> Response {
    match thumbnails.thumbnail(&extension, &size, &quality, &path).await {
        Ok(thumb) => {
            record_thumbnail_request(if thumb.from_cache { "hit" } else { "miss" });
            let mut response = (
                [(header::CACHE_CONTROL, BROWSER_CACHE_CONTROL)],
                thumb.bytes,
            )
                .into_response();
            if !thumb.content_type.is_empty() {
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    header::HeaderValue::from_static(thumb.content_type),
                );
            }
            response
        }
        Err(e) => {
            record_thumbnail_request("error");
            debug!("Thumbnail {} failed: {}", path, e);
            (error_status(&e), e.to_string()).into_response()
        }
    }
}

fn error_status(e: &ThumbnailError) -> StatusCode {
    if e.is_invalid_request() {
        StatusCode::BAD_REQUEST
    } else if e.is_not_found() {
        StatusCode::NOT_FOUND
    } else if matches!(e, ThumbnailError::Fetch(_)) {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_cache::FileCacheError;

    #[test]
    fn maps_errors_to_statuses() {
        assert_eq!(
            error_status(&ThumbnailError::MissingPath),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&ThumbnailError::PrivateNetwork),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&ThumbnailError::Cache(FileCacheError::Expired)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&ThumbnailError::Fetch("HTTP 500: Internal Server Error".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            error_status(&ThumbnailError::CacheNotInitialized),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
