//! # rfid-core — Foundational Types for the Badge Streaming Simulator
//!
//! Everything the ingestion client consumes but does not own lives here:
//!
//! 1. **`BadgeEvent` records.** One RFID badge scan, serialized on the wire
//!    as a single NDJSON line with a zone-less UTC timestamp.
//!
//! 2. **Data-quality validation.** [`DataQualityValidator`] splits a batch
//!    into accepted records and rejected records with human-readable
//!    reasons. Rejections are never retried.
//!
//! 3. **Record source.** [`BadgeEventGenerator`] produces synthetic batches
//!    behind the [`RecordSource`] trait so the driver can be fed by any
//!    producer.
//!
//! 4. **Injectable clock.** [`Clock`] lets token lifetimes and timestamp
//!    checks be tested without sleeping.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `rfid-*` crates (leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod event;
pub mod generator;
pub mod source;
pub mod temporal;
pub mod validation;

// Re-export primary types for ergonomic imports.
pub use error::CoreError;
pub use event::{to_ndjson, BadgeEvent, Direction, MAX_IDENTIFIER_LEN};
pub use generator::{BadgeEventGenerator, GeneratorConfig};
pub use source::{BatchOutcome, BatchValidator, RecordSource, RejectedEvent};
pub use temporal::{Clock, ManualClock, SystemClock};
pub use validation::{validate_batch, DataQualityValidator, ValidationReport};
