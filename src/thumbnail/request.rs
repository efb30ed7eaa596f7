use super::ThumbnailError;

/// Largest accepted width or height.
pub(crate) const MAX_DIMENSION: i64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// File under the resources directory.
    LocalResource,
    /// `http(s)://` URL, including uploaded files served under the asset base URL.
    RemoteUrl,
    /// Key into the file cache holding a base64 or data-URL payload.
    CachedBase64,
}

/// A parsed `/th/{extension}/{size}/{quality}/{path}` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailRequest {
    pub extension: String,
    pub width: i64,
    pub height: i64,
    pub quality: i64,
    /// Source path after prefix expansion.
    pub path: String,
    pub source: SourceKind,
}

impl ThumbnailRequest {
    /// Validate and normalize the raw route segments.
    ///
    /// Because a URL cannot carry `://` in a path segment, remote sources are
    /// written as `http/host/...` or `https/host/...`. `files/...` names an
    /// uploaded file served under `asset_base_url`.
    pub fn parse(
        extension: &str,
        size: &str,
        quality: &str,
        path: &str,
        asset_base_url: &str,
    ) -> Result<Self, ThumbnailError> {
        if extension.is_empty() {
            return Err(ThumbnailError::MissingExtension);
        }
        if size.is_empty() {
            return Err(ThumbnailError::MissingSize);
        }
        if quality.is_empty() {
            return Err(ThumbnailError::MissingQuality);
        }
        if path.is_empty() {
            return Err(ThumbnailError::MissingPath);
        }

        let (path, source) = if let Some(rest) = path.strip_prefix("http/") {
            (format!("http://{}", rest), SourceKind::RemoteUrl)
        } else if let Some(rest) = path.strip_prefix("https/") {
            (format!("https://{}", rest), SourceKind::RemoteUrl)
        } else if let Some(rest) = path.strip_prefix("cache-") {
            (rest.to_string(), SourceKind::CachedBase64)
        } else if path.starts_with("files/") {
            (
                format!("{}/{}", asset_base_url.trim_end_matches('/'), path),
                SourceKind::RemoteUrl,
            )
        } else {
            (path.to_string(), SourceKind::LocalResource)
        };

        let (width, height) = parse_size(size);
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(ThumbnailError::SizeTooLarge);
        }

        Ok(Self {
            extension: extension.to_string(),
            width,
            height,
            quality: parse_int(quality),
            path,
            source,
        })
    }

    /// Cache key: MD5 of path, extension, `WxH` and quality concatenated.
    pub fn fingerprint(&self) -> String {
        let key = format!(
            "{}{}{}x{}{}",
            self.path, self.extension, self.width, self.height, self.quality
        );
        format!("{:x}", md5::compute(key.as_bytes()))
    }

    pub fn content_type(&self) -> &'static str {
        content_type_for(&self.extension)
    }
}

/// `"WxH"` or `"W"`. An empty side of `"WxH"` defaults to 100; a bare width
/// leaves the height at 0, which keeps the aspect ratio.
pub fn parse_size(size: &str) -> (i64, i64) {
    match size.split_once('x') {
        Some((width, height)) => {
            let width = if width.is_empty() { "100" } else { width };
            let height = if height.is_empty() { "100" } else { height };
            (parse_int(width), parse_int(height))
        }
        None => (parse_int(size), 0),
    }
}

/// Lenient integer parse: anything unparsable reads as 0.
fn parse_int(value: &str) -> i64 {
    value.trim().parse::<i64>().unwrap_or(0)
}

/// Empty for extensions that are not images we encode.
pub fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        _ => "",
    }
}
