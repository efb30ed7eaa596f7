//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per server endpoint. When routes or request
//! formats change, update only this file.

#![allow(dead_code)]

use super::constants::*;
use reqwest::{Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// GET /
    pub async fn get_home(&self) -> Response {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .expect("Home request failed")
    }

    // ========================================================================
    // Thumbnails and files
    // ========================================================================

    /// GET /th/{extension}/{size}/{quality}/{path}
    pub async fn get_thumbnail(
        &self,
        extension: &str,
        size: &str,
        quality: &str,
        path: &str,
    ) -> Response {
        self.client
            .get(format!(
                "{}/th/{}/{}/{}/{}",
                self.base_url, extension, size, quality, path
            ))
            .send()
            .await
            .expect("Thumbnail request failed")
    }

    /// GET /files/{path}
    pub async fn get_file(&self, path: &str) -> Response {
        self.client
            .get(format!("{}/files/{}", self.base_url, path))
            .send()
            .await
            .expect("File request failed")
    }

    // ========================================================================
    // Task queue
    // ========================================================================

    /// GET /v1/tasks
    pub async fn list_tasks(&self) -> Response {
        self.client
            .get(format!("{}/v1/tasks", self.base_url))
            .send()
            .await
            .expect("List tasks request failed")
    }

    /// POST /v1/tasks/{alias} with an optional JSON parameter object
    pub async fn enqueue_task(&self, alias: &str, params: Option<Value>) -> Response {
        let mut request = self
            .client
            .post(format!("{}/v1/tasks/{}", self.base_url, alias));
        if let Some(params) = params {
            request = request.json(&params);
        }
        request.send().await.expect("Enqueue request failed")
    }

    /// POST /v1/tasks/{alias} with a raw body
    pub async fn enqueue_task_raw(&self, alias: &str, body: &str) -> Response {
        self.client
            .post(format!("{}/v1/tasks/{}", self.base_url, alias))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("Enqueue request failed")
    }

    /// GET /v1/queue/{id}
    pub async fn get_queued_task(&self, id: &str) -> Response {
        self.client
            .get(format!("{}/v1/queue/{}", self.base_url, id))
            .send()
            .await
            .expect("Queue request failed")
    }

    /// Polls the queue entry until it reaches a terminal status and returns it.
    ///
    /// # Panics
    ///
    /// Panics if the entry is still queued or running after the timeout.
    pub async fn wait_for_task(&self, id: &str) -> Value {
        let start = std::time::Instant::now();
        loop {
            let response = self.get_queued_task(id).await;
            assert_eq!(response.status(), StatusCode::OK);
            let task: Value = response.json().await.expect("Invalid queue entry JSON");
            let status = task["status"].as_str().unwrap_or_default();
            if status == "succeeded" || status == "failed" {
                return task;
            }
            if start.elapsed() > Duration::from_millis(TASK_COMPLETION_TIMEOUT_MS) {
                panic!("Task {} still {} after timeout", id, status);
            }
            tokio::time::sleep(Duration::from_millis(TASK_POLL_INTERVAL_MS)).await;
        }
    }
}
