//! End-to-end tests for the thumbnail route
//!
//! Covers every source kind (local resource, uploaded file, cached payload and
//! remote URL) plus the request validation errors.

mod common;

use base64::Engine;
use common::{
    png_bytes, TestClient, TestServer, RESOURCE_IMAGE, RESOURCE_IMAGE_HEIGHT,
    RESOURCE_IMAGE_WIDTH, UPLOADED_IMAGE,
};
use image::GenericImageView;
use reqwest::StatusCode;
use std::time::Duration;

async fn decode(response: reqwest::Response) -> image::DynamicImage {
    let bytes = response.bytes().await.unwrap();
    image::load_from_memory(&bytes).unwrap()
}

#[tokio::test]
async fn test_resizes_local_resource() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.get_thumbnail("png", "10x8", "90", RESOURCE_IMAGE).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(response.headers()["cache-control"], "max-age=604800");

    assert_eq!(decode(response).await.dimensions(), (10, 8));
}

#[tokio::test]
async fn test_zero_height_keeps_aspect_ratio() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.get_thumbnail("jpg", "20", "80", RESOURCE_IMAGE).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/jpeg");

    let expected_height = 20 * RESOURCE_IMAGE_HEIGHT / RESOURCE_IMAGE_WIDTH;
    assert_eq!(decode(response).await.dimensions(), (20, expected_height));
}

#[tokio::test]
async fn test_second_request_is_served_from_cache() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let first = client.get_thumbnail("png", "12x12", "80", RESOURCE_IMAGE).await;
    assert_eq!(first.status(), StatusCode::OK);
    let first_bytes = first.bytes().await.unwrap();

    std::fs::remove_file(server.config.resources_dir.join(RESOURCE_IMAGE)).unwrap();

    let second = client.get_thumbnail("png", "12x12", "80", RESOURCE_IMAGE).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.bytes().await.unwrap(), first_bytes);

    // A size that was never generated needs the source again
    let other = client.get_thumbnail("png", "13x13", "80", RESOURCE_IMAGE).await;
    assert_eq!(other.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_uploaded_file_is_fetched_from_asset_base_url() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let direct = client.get_file(UPLOADED_IMAGE).await;
    assert_eq!(direct.status(), StatusCode::OK);

    let response = client
        .get_thumbnail("gif", "5x5", "80", &format!("files/{}", UPLOADED_IMAGE))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/gif");
    assert_eq!(decode(response).await.dimensions(), (5, 5));
}

#[tokio::test]
async fn test_cached_payload_source() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let payload = format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png_bytes(16, 16))
    );
    server
        .services
        .file_cache
        .as_ref()
        .unwrap()
        .save("upload-42", payload.as_bytes(), Duration::from_secs(60))
        .unwrap();

    let response = client.get_thumbnail("png", "4x4", "80", "cache-upload-42").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(decode(response).await.dimensions(), (4, 4));

    let response = client.get_thumbnail("png", "4x4", "80", "cache-missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejects_private_remote_hosts() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    for path in [
        "http/localhost/a.png",
        "http/127.0.0.1/a.png",
        "https/192.168.1.10/a.png",
        "https/10.0.0.5/a.png",
        "http/printer.local/a.png",
        "https/wiki.corp.example/a.png",
    ] {
        let response = client.get_thumbnail("png", "10x10", "80", path).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", path);
        assert_eq!(
            response.text().await.unwrap(),
            "access to private networks is not allowed"
        );
    }
}

#[tokio::test]
async fn test_validation_errors() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.get_thumbnail("png", "6000x10", "80", RESOURCE_IMAGE).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text().await.unwrap(), "size is too large");

    let response = client.get_thumbnail("png", "10x10", "80", "missing.png").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client.get_thumbnail("png", "10x10", "80", "../siteworks.toml").await;
    assert!(response.status().is_client_error());
}
