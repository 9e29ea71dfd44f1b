//! Scoped-token exchange.
//!
//! The ingest host does not accept identity assertions directly. Each
//! channel open trades a fresh assertion for a token scoped to the ingest
//! host at `POST {account_url}/oauth/token`.

use std::fmt;
use std::time::Duration;

use rfid_auth::IdentityAssertion;
use serde::Serialize;
use tokio::time::Instant;
use url::Url;
use zeroize::Zeroizing;

use crate::discovery::IngestHost;
use crate::error::StreamingError;
use crate::{KEYPAIR_JWT, TOKEN_TYPE_HEADER};

/// OAuth grant type for JWT bearer assertions.
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

#[derive(Debug, Serialize)]
struct ExchangeRequest<'a> {
    grant_type: &'static str,
    scope: &'a str,
}

/// A bearer token valid for channel and row calls on one ingest host.
#[derive(Clone)]
pub struct ScopedToken {
    token: Zeroizing<String>,
    scope: String,
    obtained_at: Instant,
}

impl fmt::Debug for ScopedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedToken")
            .field("token", &"[REDACTED]")
            .field("scope", &self.scope)
            .finish()
    }
}

impl ScopedToken {
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// The ingest host the token was scoped to.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Whether at least `lifetime` has passed since the exchange.
    pub fn is_older_than(&self, lifetime: Duration) -> bool {
        self.obtained_at.elapsed() >= lifetime
    }
}

/// Client for the token exchange endpoint.
#[derive(Debug, Clone)]
pub struct ScopedSessionNegotiator {
    http: reqwest::Client,
    account_url: Url,
    timeout: Duration,
}

impl ScopedSessionNegotiator {
    pub(crate) fn new(http: reqwest::Client, account_url: Url, timeout: Duration) -> Self {
        Self {
            http,
            account_url,
            timeout,
        }
    }

    /// Exchange `assertion` for a token scoped to `target`, retrying
    /// transient failures.
    pub async fn negotiate(
        &self,
        assertion: &IdentityAssertion,
        target: &IngestHost,
    ) -> Result<ScopedToken, StreamingError> {
        crate::retry::retry_transient("negotiate_scoped_token", || {
            self.negotiate_once(assertion, target)
        })
        .await
    }

    async fn negotiate_once(
        &self,
        assertion: &IdentityAssertion,
        target: &IngestHost,
    ) -> Result<ScopedToken, StreamingError> {
        let endpoint = "POST /oauth/token";
        let url = crate::join_url(self.account_url.as_str(), "oauth/token");
        let body = ExchangeRequest {
            grant_type: JWT_BEARER_GRANT,
            scope: target.host(),
        };

        let resp = self
            .http
            .post(&url)
            .bearer_auth(assertion.as_str())
            .header(TOKEN_TYPE_HEADER, KEYPAIR_JWT)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| StreamingError::Transport {
                endpoint: endpoint.into(),
                source: e,
            })?;

        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(|e| StreamingError::Transport {
            endpoint: endpoint.into(),
            source: e,
        })?;

        if !(200..300).contains(&status) {
            return Err(StreamingError::ExchangeRejected { status, body: text });
        }

        let token = extract_token(&text).ok_or_else(|| StreamingError::Deserialization {
            endpoint: endpoint.into(),
            reason: "response carried no access token".into(),
        })?;

        tracing::debug!(scope = %target, "obtained scoped token");
        Ok(ScopedToken {
            token: Zeroizing::new(token),
            scope: target.host().to_string(),
            obtained_at: Instant::now(),
        })
    }
}

/// `{"access_token": "..."}`, a JSON string, or the raw body.
fn extract_token(body: &str) -> Option<String> {
    let token = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => map.get("access_token")?.as_str()?.to_string(),
        Ok(serde_json::Value::String(s)) => s,
        _ => body.trim().to_string(),
    };
    (!token.is_empty()).then_some(token)
}
