//! Ingest-host discovery.
//!
//! `GET {account_url}/v2/streaming/hostname`, authenticated with an identity
//! assertion, returns the host that serves channel and row calls for the
//! account. The body is either the bare hostname or `{"hostname": "..."}`.

use std::time::Duration;

use rfid_auth::IdentityAssertion;
use url::Url;

use crate::error::StreamingError;
use crate::{KEYPAIR_JWT, TOKEN_TYPE_HEADER};

/// The ingest host for an account, plus the base URL calls are made on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestHost {
    host: String,
    base_url: String,
}

impl IngestHost {
    /// Build from a raw hostname, reusing `scheme` for the base URL.
    pub fn new(raw: &str, scheme: &str) -> Option<Self> {
        let host = normalize_host(raw);
        if host.is_empty() {
            return None;
        }
        Some(Self {
            base_url: format!("{scheme}://{host}"),
            host,
        })
    }

    /// Normalized hostname, also used as the token exchange scope.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// `scheme://host`, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl std::fmt::Display for IngestHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.host)
    }
}

/// Lowercase, underscores to hyphens, surrounding whitespace and any
/// scheme or trailing slash removed.
pub fn normalize_host(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('"');
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    without_scheme
        .trim_end_matches('/')
        .replace('_', "-")
        .to_lowercase()
}

/// Pull the hostname out of a discovery response body.
fn extract_hostname(body: &str) -> Option<String> {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => map
            .get("hostname")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        Ok(serde_json::Value::String(s)) => Some(s),
        _ => Some(body.to_string()),
    }
}

/// Client for the hostname endpoint.
#[derive(Debug, Clone)]
pub struct HostDiscovery {
    http: reqwest::Client,
    account_url: Url,
    timeout: Duration,
}

impl HostDiscovery {
    pub(crate) fn new(http: reqwest::Client, account_url: Url, timeout: Duration) -> Self {
        Self {
            http,
            account_url,
            timeout,
        }
    }

    /// Resolve the ingest host, retrying transient failures.
    pub async fn discover(&self, assertion: &IdentityAssertion) -> Result<IngestHost, StreamingError> {
        crate::retry::retry_transient("discover_ingest_host", || self.discover_once(assertion)).await
    }

    async fn discover_once(&self, assertion: &IdentityAssertion) -> Result<IngestHost, StreamingError> {
        let endpoint = "GET /v2/streaming/hostname";
        let url = crate::join_url(self.account_url.as_str(), "v2/streaming/hostname");

        let resp = self
            .http
            .get(&url)
            .bearer_auth(assertion.as_str())
            .header(TOKEN_TYPE_HEADER, KEYPAIR_JWT)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| StreamingError::Transport {
                endpoint: endpoint.into(),
                source: e,
            })?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| StreamingError::Transport {
            endpoint: endpoint.into(),
            source: e,
        })?;

        if !(200..300).contains(&status) {
            return Err(StreamingError::HostDiscoveryFailed { status, body });
        }

        let host = extract_hostname(&body)
            .and_then(|raw| IngestHost::new(&raw, self.account_url.scheme()))
            .ok_or_else(|| StreamingError::HostDiscoveryFailed {
                status,
                body: if body.is_empty() {
                    "empty hostname in response".into()
                } else {
                    body.clone()
                },
            })?;

        tracing::info!(ingest_host = %host, "discovered ingest host");
        Ok(host)
    }
}
