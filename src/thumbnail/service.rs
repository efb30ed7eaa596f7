use super::request::{SourceKind, ThumbnailRequest};
use super::resize::{resize_image, OutputFormat};
use super::source::{decode_cached_payload, fetch_remote, read_resource, validate_url};
use super::ThumbnailError;
use crate::app_services::AppServices;
use crate::file_cache::{FileCache, FileCacheError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// How long a generated thumbnail stays in the file cache.
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// `Cache-Control` sent along every thumbnail.
pub const BROWSER_CACHE_CONTROL: &str = "max-age=604800";

#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub from_cache: bool,
}

#[derive(Clone)]
pub struct ThumbnailService {
    file_cache: Option<Arc<FileCache>>,
    asset_base_url: String,
    resources_dir: PathBuf,
}

impl ThumbnailService {
    pub fn new(
        file_cache: Option<Arc<FileCache>>,
        asset_base_url: impl Into<String>,
        resources_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            file_cache,
            asset_base_url: asset_base_url.into(),
            resources_dir: resources_dir.into(),
        }
    }

    pub fn from_services(services: &AppServices) -> Self {
        Self::new(
            services.file_cache.clone(),
            services.settings.asset_base_url.clone(),
            services.settings.resources_dir.clone(),
        )
    }

    pub fn asset_base_url(&self) -> &str {
        &self.asset_base_url
    }

    /// Parse the route segments and serve the thumbnail.
    pub async fn thumbnail(
        &self,
        extension: &str,
        size: &str,
        quality: &str,
        path: &str,
    ) -> Result<Thumbnail, ThumbnailError> {
        let request = ThumbnailRequest::parse(extension, size, quality, path, &self.asset_base_url)?;
        self.serve(&request).await
    }

    /// Serve from the cache when possible, otherwise generate and cache for [`CACHE_TTL`].
    pub async fn serve(&self, request: &ThumbnailRequest) -> Result<Thumbnail, ThumbnailError> {
        let key = request.fingerprint();

        if let Some(cache) = &self.file_cache {
            if let Ok(bytes) = cache.fetch(&key) {
                return Ok(Thumbnail {
                    bytes,
                    content_type: request.content_type(),
                    from_cache: true,
                });
            }
        }

        let bytes = self.generate(request).await?;

        if let Some(cache) = &self.file_cache {
            if let Err(e) = cache.save(&key, &bytes, CACHE_TTL) {
                error!("Failed to cache thumbnail {}: {}", key, e);
            }
        }

        Ok(Thumbnail {
            bytes,
            content_type: request.content_type(),
            from_cache: false,
        })
    }

    async fn generate(&self, request: &ThumbnailRequest) -> Result<Vec<u8>, ThumbnailError> {
        let source = match request.source {
            SourceKind::RemoteUrl => self.load_remote(&request.path).await,
            SourceKind::CachedBase64 => self.load_cached(&request.path),
            SourceKind::LocalResource => {
                let dir = self.resources_dir.clone();
                let path = request.path.clone();
                tokio::task::spawn_blocking(move || read_resource(&dir, &path))
                    .await
                    .map_err(|e| ThumbnailError::Worker(e.to_string()))?
            }
        }
        .inspect_err(|e| error!("Failed to load thumbnail source {}: {}", request.path, e))?;

        let (width, height, quality) = (request.width, request.height, request.quality);
        let format = OutputFormat::from_extension(&request.extension);
        tokio::task::spawn_blocking(move || resize_image(&source, width, height, format, quality))
            .await
            .map_err(|e| ThumbnailError::Worker(e.to_string()))?
            .inspect_err(|e| error!("Failed to resize thumbnail {}: {}", request.path, e))
    }

    async fn load_remote(&self, raw: &str) -> Result<Vec<u8>, ThumbnailError> {
        let url = reqwest::Url::parse(raw).map_err(|_| ThumbnailError::InvalidUrl)?;
        // Our own uploads live under the asset base URL, which is usually a private host.
        let url = if self.is_own_asset(&url) {
            url
        } else {
            validate_url(raw)?
        };
        fetch_remote(url).await
    }

    /// Same origin as the asset base URL and a normalized path under `/files/`.
    fn is_own_asset(&self, url: &reqwest::Url) -> bool {
        let Ok(base) = reqwest::Url::parse(&self.asset_base_url) else {
            return false;
        };
        let prefix = format!("{}/files/", base.path().trim_end_matches('/'));
        url.origin() == base.origin() && url.path().starts_with(&prefix)
    }

    fn load_cached(&self, key: &str) -> Result<Vec<u8>, ThumbnailError> {
        let cache = self
            .file_cache
            .as_ref()
            .ok_or(ThumbnailError::CacheNotInitialized)?;
        let payload = match cache.fetch_string(key) {
            Ok(payload) => payload,
            Err(FileCacheError::Expired) => {
                info!("Cached thumbnail source {} has expired", key);
                return Err(FileCacheError::Expired.into());
            }
            Err(e) => return Err(e.into()),
        };
        decode_cached_payload(&payload)
    }
}
