//! Streaming client error types.
//!
//! Every HTTP failure carries the status code and the response body so an
//! operator can act on it without re-running with extra logging.

use crate::channel::ChannelPhase;
use crate::config::ConfigError;

/// Errors from the streaming ingestion client and driver.
#[derive(Debug, thiserror::Error)]
pub enum StreamingError {
    /// Key loading or assertion signing failed.
    #[error("credential error: {0}")]
    Credential(#[from] rfid_auth::CredentialError),

    /// The request never produced a response (connect, TLS, timeout).
    #[error("HTTP error calling {endpoint}: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },

    /// The hostname endpoint answered with a non-2xx status or no host.
    #[error("ingest host discovery returned {status}: {body}")]
    HostDiscoveryFailed { status: u16, body: String },

    /// The token endpoint refused the identity assertion.
    #[error("scoped token exchange returned {status}: {body}")]
    ExchangeRejected { status: u16, body: String },

    /// The channel could not be opened.
    #[error("opening channel {channel} returned {status}: {body}")]
    ChannelOpenFailed {
        channel: String,
        status: u16,
        body: String,
    },

    /// An operation that needs an open channel was called in another phase.
    #[error("channel {channel} is not open (state: {state})")]
    ChannelNotOpen { channel: String, state: ChannelPhase },

    /// The requested lifecycle transition is not allowed from this phase.
    #[error("channel {channel}: cannot {operation} while {state}")]
    InvalidTransition {
        channel: String,
        operation: &'static str,
        state: ChannelPhase,
    },

    /// The service rejected an append.
    #[error("append to channel {channel} returned {status}: {body}")]
    AppendFailed {
        channel: String,
        status: u16,
        body: String,
    },

    /// A 2xx append response did not carry the next continuation token.
    #[error("append to channel {channel} succeeded without a next continuation token")]
    MissingContinuationToken { channel: String },

    /// The bulk channel status call failed.
    #[error("status of channel {channel} returned {status}: {body}")]
    StatusFailed {
        channel: String,
        status: u16,
        body: String,
    },

    /// The channel DELETE call failed.
    #[error("dropping channel {channel} returned {status}: {body}")]
    DropFailed {
        channel: String,
        status: u16,
        body: String,
    },

    /// A response body did not have the expected shape.
    #[error("failed to deserialize response from {endpoint}: {reason}")]
    Deserialization { endpoint: String, reason: String },

    /// Batch size and rate do not yield a positive, finite pacing interval.
    #[error("invalid ingestion rate: batch_size={batch_size}, events_per_second={events_per_second}")]
    InvalidRate {
        batch_size: usize,
        events_per_second: f64,
    },

    /// Records could not be encoded for the wire.
    #[error("record encoding failed: {0}")]
    Encoding(#[from] rfid_core::CoreError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl StreamingError {
    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HostDiscoveryFailed { status, .. }
            | Self::ExchangeRejected { status, .. }
            | Self::ChannelOpenFailed { status, .. }
            | Self::AppendFailed { status, .. }
            | Self::StatusFailed { status, .. }
            | Self::DropFailed { status, .. } => Some(*status),
            Self::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether a control-plane retry could succeed: transport failures and
    /// 5xx answers. Appends are never reported transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::HostDiscoveryFailed { status, .. }
            | Self::ExchangeRejected { status, .. }
            | Self::ChannelOpenFailed { status, .. }
            | Self::StatusFailed { status, .. }
            | Self::DropFailed { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_failed_display_has_channel_status_and_body() {
        let err = StreamingError::AppendFailed {
            channel: "rfid_channel_001".into(),
            status: 500,
            body: "internal error".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("rfid_channel_001"));
        assert!(msg.contains("500"));
        assert!(msg.contains("internal error"));
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn server_errors_on_control_plane_are_transient() {
        let err = StreamingError::ExchangeRejected {
            status: 503,
            body: String::new(),
        };
        assert!(err.is_transient());

        let err = StreamingError::ExchangeRejected {
            status: 401,
            body: String::new(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn append_failures_are_never_transient() {
        let err = StreamingError::AppendFailed {
            channel: "c".into(),
            status: 503,
            body: String::new(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn channel_not_open_names_state() {
        let err = StreamingError::ChannelNotOpen {
            channel: "c".into(),
            state: ChannelPhase::Unopened,
        };
        assert!(format!("{err}").contains("UNOPENED"));
    }

    #[test]
    fn invalid_rate_display() {
        let err = StreamingError::InvalidRate {
            batch_size: 100,
            events_per_second: 0.0,
        };
        let msg = format!("{err}");
        assert!(msg.contains("batch_size=100"));
        assert!(msg.contains("events_per_second=0"));
    }
}
