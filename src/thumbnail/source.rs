use super::ThumbnailError;
use base64::Engine;
use reqwest::Url;
use std::path::{Component, Path};
use std::time::Duration;
use tracing::debug;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const FETCH_USER_AGENT: &str = "ThumbnailService/1.0";

/// Reject URLs that are malformed, non-HTTP or that point at internal hosts.
pub fn validate_url(raw: &str) -> Result<Url, ThumbnailError> {
    let url = Url::parse(raw).map_err(|_| ThumbnailError::InvalidUrl)?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ThumbnailError::SchemeNotAllowed);
    }
    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host.trim_matches(|c| c == '[' || c == ']'),
        _ => return Err(ThumbnailError::InvalidHostname),
    };
    if is_private_host(host) {
        return Err(ThumbnailError::PrivateNetwork);
    }
    if host.contains("::") {
        return Err(ThumbnailError::UntrustedDomain);
    }
    Ok(url)
}

/// Loopback, private ranges, link-local and internal domain names.
///
/// The whole `172.` block counts as private, not only `172.16.0.0/12`.
pub fn is_private_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    if host == "localhost" || host == "127.0.0.1" || host == "::1" {
        return true;
    }
    if ["192.168.", "10.", "172.", "169.254."]
        .iter()
        .any(|prefix| host.starts_with(prefix))
    {
        return true;
    }
    host.ends_with(".local") || host.ends_with(".internal") || host.contains(".corp.")
}

/// Download an image. Only `200 OK` responses with an `image/*` content type are accepted.
pub(super) async fn fetch_remote(url: Url) -> Result<Vec<u8>, ThumbnailError> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .user_agent(FETCH_USER_AGENT)
        .build()
        .map_err(|e| ThumbnailError::Fetch(e.to_string()))?;

    debug!("Fetching thumbnail source {}", url);
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ThumbnailError::Fetch(e.to_string()))?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(ThumbnailError::Fetch(format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if !content_type.starts_with("image/") {
        return Err(ThumbnailError::Fetch(format!(
            "invalid content type: {}",
            content_type
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ThumbnailError::Fetch(e.to_string()))?;
    Ok(bytes.to_vec())
}

/// Decode a cached payload: either plain base64 or a `data:image/...;base64,` URL.
pub fn decode_cached_payload(payload: &str) -> Result<Vec<u8>, ThumbnailError> {
    let mut payload = payload.trim();
    if payload.starts_with("data:image") {
        payload = match payload.split_once(',') {
            Some((_, data)) => data,
            None => return Err(ThumbnailError::InvalidDataUrl),
        };
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| ThumbnailError::Decode(e.to_string()))
}

/// Read `relative` from the resources directory. Paths escaping the directory are refused.
pub(super) fn read_resource(resources_dir: &Path, relative: &str) -> Result<Vec<u8>, ThumbnailError> {
    let relative = Path::new(relative.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(ThumbnailError::ResourceNotFound(
            relative.display().to_string(),
        ));
    }
    match std::fs::read(resources_dir.join(relative)) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
            ThumbnailError::ResourceNotFound(relative.display().to_string()),
        ),
        Err(e) => Err(ThumbnailError::Resource(e.to_string())),
    }
}
