//! # Channel Sessions
//!
//! A channel is the unit of ordered ingestion into a pipe. Every append
//! presents the continuation token returned by the previous call, so a
//! channel's appends form a strict chain.
//!
//! ## Lifecycle
//!
//! ```text
//!             open()               close() / drop_channel()
//!  UNOPENED ──────────▶ OPEN ───────────────────────────────▶ CLOSED
//!     ▲                  │ ▲                                   │
//!     │ open() fails     │ │ append() / status()               │
//!     └──────────────────┘ └───┘                               │
//!                        ▲              open()                 │
//!                        └─────────────────────────────────────┘
//! ```
//!
//! The phase is checked on every operation. An append outside `OPEN` fails
//! with [`StreamingError::ChannelNotOpen`] before any request is made.
//! `append` takes `&mut self`, so one chain never has two appends in
//! flight.
//!
//! ## Failure Semantics
//!
//! A failed append leaves the continuation token and offset untouched. The
//! batch is not replayed; the caller decides whether to stop.
//!
//! ## Close vs. Drop
//!
//! [`ChannelSession::close`] only ends the local session. The server keeps
//! the channel until it times out, which lets a later run resume it.
//! [`ChannelSession::drop_channel`] deletes it on the server.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rfid_core::{to_ndjson, BadgeEvent};
use serde::{Deserialize, Serialize};

use crate::discovery::IngestHost;
use crate::error::StreamingError;
use crate::negotiate::ScopedToken;
use crate::StreamingClient;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelPhase {
    Unopened,
    Open,
    Closed,
}

impl ChannelPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unopened => "UNOPENED",
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for ChannelPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a session's chain position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelState {
    pub phase: ChannelPhase,
    /// Token the next append must present.
    pub continuation_token: Option<String>,
    /// Rows appended through this session.
    pub offset_token: u64,
    /// Successful append calls.
    pub appends: u64,
}

/// Per-channel entry of the bulk status response.
///
/// Only commonly returned fields are typed; anything else is kept in
/// `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelStatus {
    #[serde(default)]
    pub channel_status_code: Option<String>,
    #[serde(default)]
    pub last_committed_offset_token: Option<String>,
    #[serde(default)]
    pub rows_inserted: Option<u64>,
    #[serde(default)]
    pub rows_error_count: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OpenChannelResponse {
    #[serde(default)]
    next_continuation_token: Option<String>,
    #[serde(default)]
    channel_status: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AppendRowsResponse {
    #[serde(default)]
    next_continuation_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct BulkStatusRequest<'a> {
    channel_names: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct BulkStatusResponse {
    #[serde(default)]
    channel_statuses: HashMap<String, ChannelStatus>,
}

/// Session for one channel of the configured pipe.
pub struct ChannelSession {
    client: Arc<StreamingClient>,
    name: String,
    phase: ChannelPhase,
    host: Option<IngestHost>,
    scoped: Option<ScopedToken>,
    continuation_token: Option<String>,
    offset_token: u64,
    appends: u64,
}

impl fmt::Debug for ChannelSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSession")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("host", &self.host)
            .field("offset_token", &self.offset_token)
            .field("appends", &self.appends)
            .finish()
    }
}

impl ChannelSession {
    pub(crate) fn new(client: Arc<StreamingClient>, name: &str) -> Self {
        Self {
            client,
            name: name.to_string(),
            phase: ChannelPhase::Unopened,
            host: None,
            scoped: None,
            continuation_token: None,
            offset_token: 0,
            appends: 0,
        }
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn channel_name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> ChannelPhase {
        self.phase
    }

    pub fn state(&self) -> ChannelState {
        ChannelState {
            phase: self.phase,
            continuation_token: self.continuation_token.clone(),
            offset_token: self.offset_token,
            appends: self.appends,
        }
    }

    pub fn continuation_token(&self) -> Option<&str> {
        self.continuation_token.as_deref()
    }

    pub fn offset_token(&self) -> u64 {
        self.offset_token
    }

    /// The ingest host, once the session has been opened.
    pub fn ingest_host(&self) -> Option<&IngestHost> {
        self.host.as_ref()
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Open (or re-open) the channel.
    ///
    /// Discovers the ingest host if needed, exchanges a fresh identity
    /// assertion for a scoped token, then `PUT`s the channel. On failure the
    /// phase is unchanged.
    #[tracing::instrument(level = "info", skip_all, fields(channel = %self.name))]
    pub async fn open(&mut self) -> Result<(), StreamingError> {
        if self.phase == ChannelPhase::Open {
            return Err(StreamingError::InvalidTransition {
                channel: self.name.clone(),
                operation: "open",
                state: self.phase,
            });
        }

        let host = self.client.ingest_host().await?;
        let scoped = self.negotiate(&host).await?;

        let endpoint = format!("PUT /channels/{}", self.name);
        let url = self.channel_url(&host);
        let resp = self
            .client
            .http()
            .put(&url)
            .bearer_auth(scoped.as_str())
            .json(&serde_json::json!({}))
            .timeout(self.client.config().control_timeout)
            .send()
            .await
            .map_err(|e| StreamingError::Transport {
                endpoint: endpoint.clone(),
                source: e,
            })?;

        let status = resp.status().as_u16();
        let body = read_body(resp, &endpoint).await?;
        if !(200..300).contains(&status) {
            return Err(StreamingError::ChannelOpenFailed {
                channel: self.name.clone(),
                status,
                body,
            });
        }

        let parsed: OpenChannelResponse =
            serde_json::from_str(&body).map_err(|e| StreamingError::Deserialization {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
        let token = parsed
            .next_continuation_token
            .ok_or_else(|| StreamingError::Deserialization {
                endpoint,
                reason: "open response carried no next_continuation_token".into(),
            })?;

        tracing::info!(
            channel = %self.name,
            ingest_host = %host,
            channel_status = ?parsed.channel_status,
            "channel opened"
        );

        self.host = Some(host);
        self.scoped = Some(scoped);
        self.continuation_token = Some(token);
        self.phase = ChannelPhase::Open;
        Ok(())
    }

    /// Append `batch` as NDJSON rows.
    ///
    /// Returns the number of rows appended. An empty batch is a no-op.
    #[tracing::instrument(level = "debug", skip_all, fields(channel = %self.name))]
    pub async fn append(&mut self, batch: &[BadgeEvent]) -> Result<usize, StreamingError> {
        let (host, continuation) = self.require_open()?;
        if batch.is_empty() {
            return Ok(0);
        }

        let payload = to_ndjson(batch)?;
        let next_offset = self.offset_token + batch.len() as u64;
        let scoped = self.fresh_scoped_token(&host).await?;

        let endpoint = format!("POST /channels/{}/rows", self.name);
        let url = crate::join_url(
            host.base_url(),
            &format!(
                "v2/streaming/data/{}/channels/{}/rows",
                self.pipe_path(),
                self.name
            ),
        );
        let offset_param = next_offset.to_string();

        let resp = self
            .client
            .http()
            .post(&url)
            .query(&[
                ("continuationToken", continuation.as_str()),
                ("offsetToken", offset_param.as_str()),
            ])
            .bearer_auth(scoped.as_str())
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(payload)
            .timeout(self.client.config().append_timeout)
            .send()
            .await
            .map_err(|e| StreamingError::Transport {
                endpoint: endpoint.clone(),
                source: e,
            })?;

        let status = resp.status().as_u16();
        let body = read_body(resp, &endpoint).await?;
        if !(200..300).contains(&status) {
            return Err(StreamingError::AppendFailed {
                channel: self.name.clone(),
                status,
                body,
            });
        }

        let parsed: AppendRowsResponse =
            serde_json::from_str(&body).map_err(|e| StreamingError::Deserialization {
                endpoint,
                reason: e.to_string(),
            })?;
        let token = parsed
            .next_continuation_token
            .ok_or_else(|| StreamingError::MissingContinuationToken {
                channel: self.name.clone(),
            })?;

        self.continuation_token = Some(token);
        self.offset_token = next_offset;
        self.appends += 1;
        tracing::debug!(
            channel = %self.name,
            rows = batch.len(),
            offset_token = self.offset_token,
            "appended rows"
        );
        Ok(batch.len())
    }

    /// Fetch this channel's entry from the bulk status endpoint.
    #[tracing::instrument(level = "info", skip_all, fields(channel = %self.name))]
    pub async fn status(&mut self) -> Result<ChannelStatus, StreamingError> {
        let (host, _) = self.require_open()?;
        let scoped = self.fresh_scoped_token(&host).await?;

        let endpoint = "POST :bulk-channel-status".to_string();
        let url = crate::join_url(
            host.base_url(),
            &format!("v2/streaming/{}:bulk-channel-status", self.pipe_path()),
        );
        let resp = self
            .client
            .http()
            .post(&url)
            .bearer_auth(scoped.as_str())
            .json(&BulkStatusRequest {
                channel_names: [self.name.as_str()],
            })
            .timeout(self.client.config().control_timeout)
            .send()
            .await
            .map_err(|e| StreamingError::Transport {
                endpoint: endpoint.clone(),
                source: e,
            })?;

        let status = resp.status().as_u16();
        let body = read_body(resp, &endpoint).await?;
        if !(200..300).contains(&status) {
            return Err(StreamingError::StatusFailed {
                channel: self.name.clone(),
                status,
                body,
            });
        }

        let mut parsed: BulkStatusResponse =
            serde_json::from_str(&body).map_err(|e| StreamingError::Deserialization {
                endpoint,
                reason: e.to_string(),
            })?;
        match parsed.channel_statuses.remove(&self.name) {
            Some(entry) => Ok(entry),
            None => {
                tracing::warn!(channel = %self.name, "status response has no entry for channel");
                Ok(ChannelStatus::default())
            }
        }
    }

    /// End the local session. No request is made; the server-side channel
    /// persists until it times out.
    pub fn close(&mut self) -> Result<(), StreamingError> {
        if self.phase != ChannelPhase::Open {
            return Err(StreamingError::ChannelNotOpen {
                channel: self.name.clone(),
                state: self.phase,
            });
        }
        self.phase = ChannelPhase::Closed;
        tracing::info!(
            channel = %self.name,
            offset_token = self.offset_token,
            "channel closed locally; the server-side channel remains until it times out"
        );
        Ok(())
    }

    /// Delete the channel on the server. A channel that is already gone
    /// counts as dropped.
    #[tracing::instrument(level = "info", skip_all, fields(channel = %self.name))]
    pub async fn drop_channel(&mut self) -> Result<(), StreamingError> {
        let Some(host) = self.host.clone() else {
            return Err(StreamingError::ChannelNotOpen {
                channel: self.name.clone(),
                state: self.phase,
            });
        };
        let scoped = self.fresh_scoped_token(&host).await?;

        let endpoint = format!("DELETE /channels/{}", self.name);
        let url = self.channel_url(&host);
        let resp = self
            .client
            .http()
            .delete(&url)
            .bearer_auth(scoped.as_str())
            .timeout(self.client.config().control_timeout)
            .send()
            .await
            .map_err(|e| StreamingError::Transport {
                endpoint: endpoint.clone(),
                source: e,
            })?;

        let status = resp.status().as_u16();
        if !matches!(status, 200 | 202 | 204 | 404) {
            let body = read_body(resp, &endpoint).await?;
            return Err(StreamingError::DropFailed {
                channel: self.name.clone(),
                status,
                body,
            });
        }

        self.phase = ChannelPhase::Closed;
        self.continuation_token = None;
        tracing::info!(channel = %self.name, status, "channel dropped");
        Ok(())
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn require_open(&self) -> Result<(IngestHost, String), StreamingError> {
        match (self.phase, &self.host, &self.continuation_token) {
            (ChannelPhase::Open, Some(host), Some(token)) => Ok((host.clone(), token.clone())),
            _ => Err(StreamingError::ChannelNotOpen {
                channel: self.name.clone(),
                state: self.phase,
            }),
        }
    }

    async fn negotiate(&self, host: &IngestHost) -> Result<ScopedToken, StreamingError> {
        let assertion = self.client.issuer().current()?;
        self.client.negotiator().negotiate(&assertion, host).await
    }

    /// The current scoped token, renegotiated first if it has aged out.
    async fn fresh_scoped_token(&mut self, host: &IngestHost) -> Result<ScopedToken, StreamingError> {
        let lifetime = self.client.config().scoped_token_lifetime;
        match &self.scoped {
            Some(token) if !token.is_older_than(lifetime) => Ok(token.clone()),
            _ => {
                tracing::debug!(channel = %self.name, "renegotiating scoped token");
                let token = self.negotiate(host).await?;
                self.scoped = Some(token.clone());
                Ok(token)
            }
        }
    }

    fn pipe_path(&self) -> String {
        let cfg = self.client.config();
        format!(
            "databases/{}/schemas/{}/pipes/{}",
            cfg.database, cfg.schema, cfg.pipe
        )
    }

    fn channel_url(&self, host: &IngestHost) -> String {
        crate::join_url(
            host.base_url(),
            &format!("v2/streaming/{}/channels/{}", self.pipe_path(), self.name),
        )
    }
}

async fn read_body(resp: reqwest::Response, endpoint: &str) -> Result<String, StreamingError> {
    resp.text().await.map_err(|e| StreamingError::Transport {
        endpoint: endpoint.to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_display_is_upper_case() {
        assert_eq!(ChannelPhase::Unopened.to_string(), "UNOPENED");
        assert_eq!(ChannelPhase::Open.to_string(), "OPEN");
        assert_eq!(ChannelPhase::Closed.to_string(), "CLOSED");
    }

    #[test]
    fn status_entry_keeps_unknown_fields() {
        let status: ChannelStatus = serde_json::from_value(serde_json::json!({
            "channel_status_code": "SUCCESS",
            "last_committed_offset_token": "300",
            "snowflake_avg_processing_latency_ms": 12
        }))
        .unwrap();
        assert_eq!(status.channel_status_code.as_deref(), Some("SUCCESS"));
        assert_eq!(status.last_committed_offset_token.as_deref(), Some("300"));
        assert!(status.extra.contains_key("snowflake_avg_processing_latency_ms"));
    }

    #[test]
    fn bulk_status_request_shape() {
        let body = serde_json::to_value(BulkStatusRequest {
            channel_names: ["rfid_channel_001"],
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"channel_names": ["rfid_channel_001"]}));
    }
}
