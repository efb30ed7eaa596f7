//! Disk-backed key/value cache with per-entry expiry.
//!
//! Each entry is one file named after the MD5 of its key. The first line holds the
//! expiry as a unix timestamp, the rest of the file is the payload. Writes go through
//! a temp file and an atomic rename, so concurrent writers of the same key simply
//! replace each other.

use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const ENTRY_EXTENSION: &str = "cache";

#[derive(Debug, Error)]
pub enum FileCacheError {
    #[error("cache expired")]
    Expired,

    #[error("cache key not found: {0}")]
    NotFound(String),

    #[error("cache entry is corrupted: {0}")]
    Corrupted(String),

    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FileCacheError {
    pub fn is_expired(&self) -> bool {
        matches!(self, FileCacheError::Expired)
    }
}

pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, FileCacheError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{:x}.{}", md5::compute(key.as_bytes()), ENTRY_EXTENSION))
    }

    pub fn save(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), FileCacheError> {
        let expires_at = Utc::now().timestamp() + ttl.as_secs() as i64;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        writeln!(tmp, "{}", expires_at)?;
        tmp.write_all(value)?;
        tmp.flush()?;
        tmp.persist(self.entry_path(key))
            .map_err(|e| FileCacheError::Io(e.error))?;
        Ok(())
    }

    pub fn fetch(&self, key: &str) -> Result<Vec<u8>, FileCacheError> {
        let path = self.entry_path(key);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FileCacheError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let (expires_at, payload) = Self::split_entry(&bytes)
            .ok_or_else(|| FileCacheError::Corrupted(key.to_string()))?;
        if expires_at <= Utc::now().timestamp() {
            let _ = std::fs::remove_file(&path);
            return Err(FileCacheError::Expired);
        }
        Ok(payload.to_vec())
    }

    pub fn fetch_string(&self, key: &str) -> Result<String, FileCacheError> {
        let bytes = self.fetch(key)?;
        String::from_utf8(bytes).map_err(|_| FileCacheError::Corrupted(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fetch(key).is_ok()
    }

    pub fn remove(&self, key: &str) -> Result<(), FileCacheError> {
        match std::fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete expired and unreadable entries. Returns how many files were removed.
    pub fn remove_expired(&self) -> Result<usize, FileCacheError> {
        let now = Utc::now().timestamp();
        let mut removed = 0;
        for entry in walkdir::WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let expired = match std::fs::read(path) {
                Ok(bytes) => match Self::split_entry(&bytes) {
                    Some((expires_at, _)) => expires_at <= now,
                    None => true,
                },
                Err(_) => false,
            };
            if expired && std::fs::remove_file(path).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn split_entry(bytes: &[u8]) -> Option<(i64, &[u8])> {
        let newline = bytes.iter().position(|b| *b == b'\n')?;
        let expires_at = std::str::from_utf8(&bytes[..newline])
            .ok()?
            .trim()
            .parse::<i64>()
            .ok()?;
        Some((expires_at, &bytes[newline + 1..]))
    }

    /// Periodically sweep expired entries until `shutdown` fires.
    pub async fn run_expiry_loop(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        info!(
            "File cache expiry loop started (dir={:?}, interval={}s)",
            self.dir,
            interval.as_secs()
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.cancelled() => {
                    info!("File cache expiry loop shutting down");
                    break;
                }
            }

            let cache = self.clone();
            match tokio::task::spawn_blocking(move || cache.remove_expired()).await {
                Ok(Ok(0)) => {}
                Ok(Ok(removed)) => debug!("Removed {} expired cache entries", removed),
                Ok(Err(e)) => error!("Failed to sweep file cache: {}", e),
                Err(e) => error!("File cache sweep panicked: {}", e),
            }
        }
    }
}
