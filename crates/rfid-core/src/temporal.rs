//! # Clocks and Wire Timestamps
//!
//! Two concerns live here:
//!
//! - [`Clock`]: the source of "now" for token lifetimes and timestamp
//!   checks. Production code uses [`SystemClock`]; tests drive a
//!   [`ManualClock`] forward explicitly.
//! - Wire timestamp encoding. The ingestion pipe loads `event_timestamp`
//!   into a zone-less column, so instants are converted to UTC and rendered
//!   as `YYYY-MM-DDTHH:MM:SS.mmm` with no `Z` or offset suffix.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;

use crate::error::CoreError;

/// Format string for wire timestamps (millisecond precision, no zone).
pub const WIRE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Source of the current instant.
///
/// Implementations must be `Send + Sync` so a single clock can be shared
/// by every channel worker.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// The current UTC instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time from the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying instant, so a test can hand one clone
/// to the component under test and advance the other.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock();
        *now += delta;
    }

    /// Jump the clock to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock() = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Render an instant in the wire format.
pub fn format_wire_timestamp(instant: &DateTime<Utc>) -> String {
    instant.format(WIRE_TIMESTAMP_FORMAT).to_string()
}

/// Parse a wire timestamp, interpreting it as UTC.
///
/// Accepts any fractional precision (`%.f`), so values written by other
/// producers with microseconds still load.
pub fn parse_wire_timestamp(value: &str) -> Result<DateTime<Utc>, CoreError> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| CoreError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}
