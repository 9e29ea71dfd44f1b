//! # rfid-streaming — Streaming Ingestion Client
//!
//! Typed access to the streaming ingestion REST API and the driver that
//! paces records into it:
//!
//! - **Discovery** of the account's ingest host (`/v2/streaming/hostname`).
//! - **Scoped-token exchange** of identity assertions for host-scoped
//!   bearer tokens (`/oauth/token`).
//! - **Channels**: open, append rows with continuation tokens, bulk status,
//!   local close and explicit drop.
//! - **Driver**: pulls batches from a record source, validates them, and
//!   appends the survivors at a fixed rate.
//!
//! ## Architecture
//!
//! [`StreamingClient`] owns the HTTP connection pool, the configuration and
//! the [`TokenIssuer`]. It is shared behind an `Arc` by every
//! [`ChannelSession`]; a session owns its continuation chain exclusively.
//!
//! ## API Path Convention
//!
//! Discovery and exchange go to the account URL. Channel and row calls go
//! to the discovered ingest host under
//! `/v2/streaming[/data]/databases/{db}/schemas/{schema}/pipes/{pipe}`.

pub mod channel;
pub mod config;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod negotiate;
pub(crate) mod retry;

pub use channel::{ChannelPhase, ChannelSession, ChannelState, ChannelStatus};
pub use config::{ConfigError, StreamingConfig};
pub use discovery::{HostDiscovery, IngestHost};
pub use driver::{BatchSink, DriverConfig, IngestionDriver, RunError, RunLimit, RunSummary};
pub use error::StreamingError;
pub use negotiate::{ScopedSessionNegotiator, ScopedToken};

use std::sync::Arc;

use rfid_auth::TokenIssuer;
use tokio::sync::OnceCell;

/// Header naming the kind of bearer credential on discovery and exchange.
pub(crate) const TOKEN_TYPE_HEADER: &str = "X-Snowflake-Authorization-Token-Type";
pub(crate) const KEYPAIR_JWT: &str = "KEYPAIR_JWT";

/// Top-level streaming client. Holds the sub-clients and the discovered
/// ingest host.
#[derive(Debug)]
pub struct StreamingClient {
    config: StreamingConfig,
    http: reqwest::Client,
    issuer: Arc<TokenIssuer>,
    discovery: HostDiscovery,
    negotiator: ScopedSessionNegotiator,
    ingest_host: OnceCell<IngestHost>,
}

impl StreamingClient {
    /// Create a client from configuration and a token issuer.
    pub fn new(config: StreamingConfig, issuer: Arc<TokenIssuer>) -> Result<Self, StreamingError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.control_timeout)
            .build()
            .map_err(|e| StreamingError::Transport {
                endpoint: "client_init".into(),
                source: e,
            })?;

        Ok(Self {
            discovery: HostDiscovery::new(
                http.clone(),
                config.account_url.clone(),
                config.control_timeout,
            ),
            negotiator: ScopedSessionNegotiator::new(
                http.clone(),
                config.account_url.clone(),
                config.control_timeout,
            ),
            http,
            issuer,
            config,
            ingest_host: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// The issuer that signs identity assertions for this client.
    pub fn issuer(&self) -> &Arc<TokenIssuer> {
        &self.issuer
    }

    /// Access the hostname discovery client.
    pub fn discovery(&self) -> &HostDiscovery {
        &self.discovery
    }

    /// Access the scoped-token exchange client.
    pub fn negotiator(&self) -> &ScopedSessionNegotiator {
        &self.negotiator
    }

    /// The ingest host, discovered on first use and cached afterwards.
    pub async fn ingest_host(&self) -> Result<IngestHost, StreamingError> {
        self.ingest_host
            .get_or_try_init(|| async {
                let assertion = self.issuer.current().map_err(StreamingError::from)?;
                self.discovery.discover(&assertion).await
            })
            .await
            .cloned()
    }

    /// A new, unopened session for `channel_name`.
    pub fn channel(self: &Arc<Self>, channel_name: &str) -> Result<ChannelSession, StreamingError> {
        config::validate_identifier("channel_name", channel_name)?;
        Ok(ChannelSession::new(Arc::clone(self), channel_name))
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

/// Append `path` to `base` with exactly one slash between them.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
