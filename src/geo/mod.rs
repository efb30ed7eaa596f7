//! IP to country lookup.
//!
//! The lookup endpoint answers with a `;`-delimited line such as `1;DE;DEU;Germany`,
//! where the second field is the two-letter country code.

use anyhow::{bail, Context, Result};
use std::time::Duration;
use tracing::debug;

/// Country could not be determined.
pub const COUNTRY_UNKNOWN: &str = "UN";
/// The lookup itself failed.
pub const COUNTRY_ERROR: &str = "ER";

pub const DEFAULT_GEO_ENDPOINT: &str = "https://ip2c.org/";

pub trait GeoLocator: Send + Sync {
    /// Fetch the raw lookup response for `ip`. Non-success statuses are errors.
    fn lookup(&self, ip: &str) -> Result<String>;
}

/// Resolve the country code for `ip`, never failing.
pub fn find_country_by_ip(locator: &dyn GeoLocator, ip: &str) -> String {
    let ip = ip.trim();
    if ip.is_empty() || ip == "127.0.0.1" {
        return COUNTRY_UNKNOWN.to_string();
    }
    match locator.lookup(ip) {
        Ok(body) => parse_country(&body),
        Err(e) => {
            debug!("Geo lookup for {} failed: {:#}", ip, e);
            COUNTRY_ERROR.to_string()
        }
    }
}

pub fn parse_country(body: &str) -> String {
    let parts: Vec<&str> = body.split(';').collect();
    if parts.len() <= 2 {
        return COUNTRY_UNKNOWN.to_string();
    }
    let country = parts[1].trim();
    if country.is_empty() {
        COUNTRY_UNKNOWN.to_string()
    } else {
        country.to_string()
    }
}

/// Blocking HTTP lookup against `{endpoint}{ip}` with a per-request timeout.
pub struct HttpGeoLocator {
    endpoint: String,
    timeout: Duration,
}

impl HttpGeoLocator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

impl GeoLocator for HttpGeoLocator {
    fn lookup(&self, ip: &str) -> Result<String> {
        // Built per call: a blocking client must not be dropped inside an async context.
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .context("Failed to build geo lookup client")?;

        let url = format!("{}{}", self.endpoint, urlencoding::encode(ip));
        let response = client
            .get(&url)
            .send()
            .with_context(|| format!("Geo lookup request to {} failed", url))?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            bail!("Geo lookup returned HTTP {}", status);
        }
        response.text().context("Failed to read geo lookup response")
    }
}
