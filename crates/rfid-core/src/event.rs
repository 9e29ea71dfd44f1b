//! # Badge Events
//!
//! A [`BadgeEvent`] is one RFID badge scan. Fields are public: the
//! validator must be able to see (and reject) malformed records, so
//! construction does not enforce business rules.
//!
//! ## Wire Shape
//!
//! Each record is one JSON object on its own line:
//!
//! ```json
//! {"badge_id":"BADGE-00001","user_id":"USR-001","zone_id":"ZONE-LOBBY-1","reader_id":"RDR-001","event_timestamp":"2025-10-31T14:23:45.123","signal_strength":-45.5,"direction":"ENTRY"}
//! ```
//!
//! Absent optional fields are written as `null`, never omitted, so every
//! line carries the same column set.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;
use crate::temporal::{format_wire_timestamp, parse_wire_timestamp};

/// Maximum length of any identifier field.
pub const MAX_IDENTIFIER_LEN: usize = 50;

/// Direction of movement through a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Entry,
    Exit,
}

impl Direction {
    /// The wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "ENTRY",
            Self::Exit => "EXIT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENTRY" => Ok(Self::Entry),
            "EXIT" => Ok(Self::Exit),
            other => Err(CoreError::InvalidDirection(other.to_string())),
        }
    }
}

/// A single RFID badge scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeEvent {
    /// Badge identifier, e.g. `BADGE-00001`.
    pub badge_id: String,
    /// User the badge is issued to, e.g. `USR-001`.
    pub user_id: String,
    /// Zone the reader guards, e.g. `ZONE-LOBBY-1`.
    pub zone_id: String,
    /// Reader that captured the scan, e.g. `RDR-001`.
    pub reader_id: String,
    /// When the badge was scanned.
    #[serde(
        serialize_with = "serialize_wire_timestamp",
        deserialize_with = "deserialize_wire_timestamp"
    )]
    pub event_timestamp: DateTime<Utc>,
    /// Received signal strength in dBm, `[-100, 0]` when valid.
    pub signal_strength: Option<f64>,
    /// Direction of travel, when the reader reports it.
    pub direction: Option<Direction>,
}

impl BadgeEvent {
    /// Encode this record as a single JSON line (no trailing newline).
    pub fn to_wire_line(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Encode a batch as newline-delimited JSON.
///
/// Every record is terminated by `\n`, including the last one. An empty
/// batch encodes to an empty string.
pub fn to_ndjson(batch: &[BadgeEvent]) -> Result<String, CoreError> {
    let mut out = String::with_capacity(batch.len() * 192);
    for event in batch {
        out.push_str(&event.to_wire_line()?);
        out.push('\n');
    }
    Ok(out)
}

fn serialize_wire_timestamp<S>(instant: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_wire_timestamp(instant))
}

fn deserialize_wire_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_wire_timestamp(&raw).map_err(serde::de::Error::custom)
}
