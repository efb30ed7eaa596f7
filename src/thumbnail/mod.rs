//! On-demand image thumbnails with a short-lived disk cache.
//!
//! A request names the output extension, a `WxH` size, a quality and a source path.
//! The fingerprint of those values keys the cache; on a miss the source is fetched,
//! resized, encoded and cached for [`CACHE_TTL`].

mod request;
mod resize;
mod service;
mod source;

pub use request::{content_type_for, parse_size, SourceKind, ThumbnailRequest};
pub use resize::{resize_image, OutputFormat};
pub use service::{Thumbnail, ThumbnailService, BROWSER_CACHE_CONTROL, CACHE_TTL};
pub use source::{decode_cached_payload, is_private_host, validate_url};

use crate::file_cache::FileCacheError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("image extension is missing")]
    MissingExtension,

    #[error("size is missing")]
    MissingSize,

    #[error("quality is missing")]
    MissingQuality,

    #[error("path is missing")]
    MissingPath,

    #[error("size is too large")]
    SizeTooLarge,

    #[error("invalid URL format")]
    InvalidUrl,

    #[error("only HTTP and HTTPS URLs are allowed")]
    SchemeNotAllowed,

    #[error("invalid hostname")]
    InvalidHostname,

    #[error("access to private networks is not allowed")]
    PrivateNetwork,

    #[error("untrusted domain")]
    UntrustedDomain,

    #[error("{0}")]
    Fetch(String),

    #[error("cache not initialized")]
    CacheNotInitialized,

    #[error(transparent)]
    Cache(#[from] FileCacheError),

    #[error("invalid data URL format")]
    InvalidDataUrl,

    #[error("{0}")]
    Decode(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("{0}")]
    Resource(String),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("thumbnail worker failed: {0}")]
    Worker(String),
}

impl ThumbnailError {
    /// Errors caused by the request itself rather than by a collaborator.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            ThumbnailError::MissingExtension
                | ThumbnailError::MissingSize
                | ThumbnailError::MissingQuality
                | ThumbnailError::MissingPath
                | ThumbnailError::SizeTooLarge
                | ThumbnailError::InvalidUrl
                | ThumbnailError::SchemeNotAllowed
                | ThumbnailError::InvalidHostname
                | ThumbnailError::PrivateNetwork
                | ThumbnailError::UntrustedDomain
                | ThumbnailError::InvalidDataUrl
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ThumbnailError::ResourceNotFound(_)
                | ThumbnailError::Cache(FileCacheError::NotFound(_))
                | ThumbnailError::Cache(FileCacheError::Expired)
        )
    }
}
