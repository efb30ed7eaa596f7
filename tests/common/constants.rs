//! Shared constants for end-to-end tests

#![allow(dead_code)]

// ============================================================================
// Configuration
// ============================================================================

/// Vault secret every test instance is opened with
pub const TEST_VAULT_KEY: &str = "test-vault-key";

/// Local image placed in the resources directory (40x20 PNG)
pub const RESOURCE_IMAGE: &str = "banner.png";
pub const RESOURCE_IMAGE_WIDTH: u32 = 40;
pub const RESOURCE_IMAGE_HEIGHT: u32 = 20;

/// Uploaded image placed in the files directory (30x30 PNG)
pub const UPLOADED_IMAGE: &str = "uploads/avatar.png";

// ============================================================================
// Timeouts
// ============================================================================

pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// How long to wait for a queue worker to finish an entry
pub const TASK_COMPLETION_TIMEOUT_MS: u64 = 10_000;
pub const TASK_POLL_INTERVAL_MS: u64 = 100;
