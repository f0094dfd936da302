//! HTTP plumbing for the resolver API.
//!
//! One metadata call per request plus, when the delivery ladder chooses to
//! proxy, one capped byte download. No retries, no circuit breaking: every
//! failure is converted into a bounded, user-readable `ResolverError`.

use super::{parse_body, ResolvedFile, ResolverError};
use crate::config;
use reqwest::{Client as HttpClient, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Client for the link-resolution API and for proxy downloads.
pub struct ResolverClient {
    /// Short-timeout client for the metadata call
    http: HttpClient,
    /// Long-timeout client for byte downloads
    transfer: HttpClient,
    api_base: String,
}

impl ResolverClient {
    /// Create a client against the given API base URL.
    ///
    /// Timeouts come from `RESOLVER_TIMEOUT_SECS` / `DOWNLOAD_TIMEOUT_SECS`
    /// (or their defaults); they prevent infinite hangs when the resolver or
    /// the file host is unresponsive.
    #[must_use]
    pub fn new(api_base: &str) -> Self {
        Self {
            http: build_client(config::get_resolver_timeout_secs()),
            transfer: build_client(config::get_download_timeout_secs()),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Resolves a share URL into the list of files it describes.
    ///
    /// # Errors
    ///
    /// Returns `ResolverError::Network` on connectivity issues,
    /// `ResolverError::Api` on non-success statuses or a reported failure,
    /// `ResolverError::Json` on malformed bodies and `ResolverError::Empty`
    /// when no files are described.
    pub async fn resolve(&self, share_url: &str) -> Result<Vec<ResolvedFile>, ResolverError> {
        let response = self
            .http
            .get(&self.api_base)
            .query(&[("url", share_url)])
            .send()
            .await
            .map_err(|e| ResolverError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ResolverError::Api(scrub_error_body(status, &body)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ResolverError::Network(e.to_string()))?;
        debug!(bytes = body.len(), "resolver responded");
        parse_body(&body)
    }

    /// Downloads at most `cap` bytes from a direct link into memory.
    ///
    /// The cap is enforced both from the advertised `Content-Length` and
    /// mid-stream, so a lying host cannot balloon the buffer.
    ///
    /// # Errors
    ///
    /// Returns `ResolverError::Network` on connectivity issues and
    /// `ResolverError::Api` on bad statuses or when the cap is exceeded.
    pub async fn download(&self, url: &str, cap: u64) -> Result<Vec<u8>, ResolverError> {
        let mut response = self
            .transfer
            .get(url)
            .send()
            .await
            .map_err(|e| ResolverError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolverError::Api(format!("download failed: {status}")));
        }
        if let Some(len) = response.content_length() {
            if len > cap {
                return Err(ResolverError::Api(format!(
                    "file is {len} bytes, above the {cap} byte proxy ceiling"
                )));
            }
        }

        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ResolverError::Network(e.to_string()))?
        {
            if (buf.len() + chunk.len()) as u64 > cap {
                return Err(ResolverError::Api(format!(
                    "download exceeded the {cap} byte proxy ceiling"
                )));
            }
            buf.extend_from_slice(&chunk);
        }
        debug!(bytes = buf.len(), "proxy download complete");
        Ok(buf)
    }
}

fn build_client(timeout_secs: u64) -> HttpClient {
    HttpClient::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Turns a non-success resolver response into a bounded message.
///
/// Detects HTML error pages from proxies so raw markup never reaches the
/// user, and truncates long plain-text bodies.
fn scrub_error_body(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim_start();
    let is_html = trimmed.starts_with("<!DOCTYPE")
        || trimmed.starts_with("<html")
        || trimmed.starts_with("<HTML");

    if is_html {
        return format!("{status} (server returned an HTML error page)");
    }

    if body.chars().count() > 500 {
        let truncated: String = body.chars().take(500).collect();
        format!("{status} - {truncated}... (truncated)")
    } else {
        format!("{status} - {body}")
    }
}
