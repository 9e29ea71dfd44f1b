//! # Collaborator Traits
//!
//! The ingestion driver does not know where records come from or which
//! rules they must pass. It talks to a [`RecordSource`] and a
//! [`BatchValidator`], and the CLI wires in the synthetic generator and the
//! data-quality validator.

use chrono::{DateTime, Utc};

use crate::event::BadgeEvent;

/// Produces batches of records for the driver.
pub trait RecordSource: Send {
    /// Produce `count` records whose timestamps start at `start`.
    fn next_batch(&mut self, count: usize, start: DateTime<Utc>) -> Vec<BadgeEvent>;
}

/// A record that failed validation, with every reason it failed.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedEvent {
    pub event: BadgeEvent,
    pub reasons: Vec<String>,
}

/// The result of validating one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// Records that may be appended, in their original order.
    pub valid: Vec<BadgeEvent>,
    /// Records excluded from the batch.
    pub rejected: Vec<RejectedEvent>,
}

/// Splits a batch into appendable and rejected records.
pub trait BatchValidator: Send + Sync {
    fn validate_batch(&self, events: Vec<BadgeEvent>) -> BatchOutcome;
}
