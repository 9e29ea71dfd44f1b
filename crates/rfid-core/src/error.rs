//! # Error Types
//!
//! Structured errors for record construction and the synthetic source,
//! built with `thiserror`. Per-record validation failures are *not*
//! errors: they are reported as [`RejectedEvent`](crate::RejectedEvent)
//! values and counted by the driver.

use thiserror::Error;

/// Errors raised by `rfid-core`.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A direction string was neither `ENTRY` nor `EXIT`.
    #[error("invalid direction {0:?}: expected ENTRY or EXIT")]
    InvalidDirection(String),

    /// A wire timestamp could not be parsed.
    #[error("invalid event timestamp {value:?}: {reason}")]
    InvalidTimestamp {
        /// The offending input.
        value: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// The generator was configured with an empty identifier pool.
    #[error("invalid generator configuration: {0}")]
    InvalidGenerator(String),

    /// JSON serialization failure while encoding a batch.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
