//! Common test infrastructure
//!
//! End-to-end tests import from this module only.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestClient, TestServer};
//! use reqwest::StatusCode;
//!
//! #[tokio::test]
//! async fn test_home() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::new(server.base_url.clone());
//!
//!     let response = client.get_home().await;
//!     assert_eq!(response.status(), StatusCode::OK);
//! }
//! ```

mod client;
mod constants;
mod fixtures;
mod server;

pub use client::TestClient;
pub use constants::*;
pub use server::TestServer;

#[allow(unused_imports)]
pub use fixtures::{open_test_services, png_bytes, TestServices};
