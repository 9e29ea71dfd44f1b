//! # Data-Quality Validation
//!
//! Checks badge events against business rules before they are appended.
//! Each check produces either an **error** (the record is always rejected)
//! or a **warning** (the record is rejected only in strict mode).
//!
//! | Check | Severity |
//! |-------|----------|
//! | identifier empty or whitespace | error |
//! | identifier longer than 50 chars | error |
//! | timestamp in the future | error |
//! | signal strength above 0 dBm | error |
//! | signal strength below -100 dBm | error |
//! | timestamp older than 30 days | warning |
//! | timestamp older than 1 hour | warning |
//! | signal strength below -80 dBm | warning |
//!
//! Rejections are final: the driver counts them and moves on.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::event::{BadgeEvent, MAX_IDENTIFIER_LEN};
use crate::source::{BatchOutcome, BatchValidator, RejectedEvent};
use crate::temporal::{Clock, SystemClock};

/// Signal strength above which a reading is physically impossible.
pub const MAX_SIGNAL_DBM: f64 = 0.0;
/// Signal strength below which a reading is discarded as noise.
pub const MIN_SIGNAL_DBM: f64 = -100.0;
/// Signal strength below which a reading is flagged as weak.
pub const WEAK_SIGNAL_DBM: f64 = -80.0;

/// Errors and warnings collected for a single event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Whether the event passes under the given strictness.
    pub fn is_valid(&self, strict: bool) -> bool {
        self.errors.is_empty() && !(strict && !self.warnings.is_empty())
    }

    /// Errors followed by warnings.
    pub fn into_messages(self) -> Vec<String> {
        let mut messages = self.errors;
        messages.extend(self.warnings);
        messages
    }
}

/// Validates badge events against the rules in the module table.
#[derive(Debug, Clone)]
pub struct DataQualityValidator {
    strict: bool,
    clock: Arc<dyn Clock>,
}

impl DataQualityValidator {
    /// Create a validator using wall-clock time.
    pub fn new(strict: bool) -> Self {
        Self::with_clock(strict, Arc::new(SystemClock))
    }

    /// Create a validator reading "now" from `clock`.
    pub fn with_clock(strict: bool, clock: Arc<dyn Clock>) -> Self {
        Self { strict, clock }
    }

    /// Whether warnings cause rejection.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Run every check against `event` and return what was found.
    pub fn inspect(&self, event: &BadgeEvent) -> ValidationReport {
        let now = self.clock.now();
        let mut report = ValidationReport::default();
        check_identifiers(event, &mut report);
        check_timestamp(&event.event_timestamp, now, &mut report);
        if let Some(signal) = event.signal_strength {
            check_signal(signal, &mut report);
        }
        report
    }

    /// Validate one event, returning `(is_valid, messages)`.
    pub fn validate_event(&self, event: &BadgeEvent) -> (bool, Vec<String>) {
        let report = self.inspect(event);
        let valid = report.is_valid(self.strict);
        (valid, report.into_messages())
    }
}

impl BatchValidator for DataQualityValidator {
    fn validate_batch(&self, events: Vec<BadgeEvent>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for event in events {
            let (valid, reasons) = self.validate_event(&event);
            if valid {
                outcome.valid.push(event);
            } else {
                tracing::debug!(
                    badge_id = %event.badge_id,
                    reasons = ?reasons,
                    "rejected badge event"
                );
                outcome.rejected.push(RejectedEvent { event, reasons });
            }
        }
        if !outcome.rejected.is_empty() {
            tracing::debug!(
                valid = outcome.valid.len(),
                rejected = outcome.rejected.len(),
                "validated batch"
            );
        }
        outcome
    }
}

/// Validate a batch with a wall-clock validator.
pub fn validate_batch(events: Vec<BadgeEvent>, strict: bool) -> BatchOutcome {
    DataQualityValidator::new(strict).validate_batch(events)
}

fn check_identifiers(event: &BadgeEvent, report: &mut ValidationReport) {
    let fields = [
        ("badge_id", event.badge_id.as_str()),
        ("user_id", event.user_id.as_str()),
        ("zone_id", event.zone_id.as_str()),
        ("reader_id", event.reader_id.as_str()),
    ];
    for (name, value) in fields {
        if value.trim().is_empty() {
            report
                .errors
                .push(format!("{name} is required and cannot be empty"));
        } else if value.chars().count() > MAX_IDENTIFIER_LEN {
            report.errors.push(format!(
                "{name} exceeds maximum length of {MAX_IDENTIFIER_LEN}"
            ));
        }
    }
}

fn check_timestamp(ts: &DateTime<Utc>, now: DateTime<Utc>, report: &mut ValidationReport) {
    if *ts > now {
        report
            .errors
            .push(format!("Event timestamp {} is in the future", ts.to_rfc3339()));
        return;
    }

    let age = now - *ts;
    if age > Duration::days(30) {
        report.warnings.push(format!(
            "Event timestamp {} is more than 30 days old",
            ts.to_rfc3339()
        ));
    }
    if age > Duration::hours(1) {
        let hours = age.num_seconds() as f64 / 3600.0;
        report.warnings.push(format!("Event is {hours:.1} hours old"));
    }
}

fn check_signal(signal: f64, report: &mut ValidationReport) {
    if signal.is_nan() {
        report
            .errors
            .push("Signal strength is not a number".to_string());
        return;
    }
    if signal > MAX_SIGNAL_DBM {
        report
            .errors
            .push(format!("Signal strength {signal} dBm cannot be positive"));
    }
    if signal < MIN_SIGNAL_DBM {
        report.errors.push(format!(
            "Signal strength {signal} dBm is too weak (< {MIN_SIGNAL_DBM} dBm)"
        ));
    }
    if signal < WEAK_SIGNAL_DBM {
        report
            .warnings
            .push(format!("Weak signal strength: {signal} dBm"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Direction;
    use crate::temporal::ManualClock;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn validator(strict: bool) -> DataQualityValidator {
        DataQualityValidator::with_clock(strict, Arc::new(ManualClock::new(now())))
    }

    fn event() -> BadgeEvent {
        BadgeEvent {
            badge_id: "BADGE-00001".into(),
            user_id: "USR-001".into(),
            zone_id: "ZONE-LOBBY-1".into(),
            reader_id: "RDR-001".into(),
            event_timestamp: now() - Duration::seconds(5),
            signal_strength: Some(-45.0),
            direction: Some(Direction::Entry),
        }
    }

    #[test]
    fn clean_event_passes_strict() {
        let (valid, messages) = validator(true).validate_event(&event());
        assert!(valid);
        assert!(messages.is_empty());
    }

    #[test]
    fn positive_signal_is_rejected() {
        let mut e = event();
        e.signal_strength = Some(5.0);
        let (valid, messages) = validator(false).validate_event(&e);
        assert!(!valid);
        assert!(messages.iter().any(|m| m.contains("cannot be positive")));
    }

    #[test]
    fn signal_below_floor_is_rejected() {
        let mut e = event();
        e.signal_strength = Some(-101.0);
        let report = validator(false).inspect(&e);
        assert!(report.errors.iter().any(|m| m.contains("too weak")));
    }

    #[test]
    fn weak_signal_is_only_a_warning() {
        let mut e = event();
        e.signal_strength = Some(-85.0);
        assert!(validator(false).validate_event(&e).0);
        assert!(!validator(true).validate_event(&e).0);
    }

    #[test]
    fn missing_signal_is_fine() {
        let mut e = event();
        e.signal_strength = None;
        e.direction = None;
        assert!(validator(true).validate_event(&e).0);
    }

    #[test]
    fn blank_identifier_is_rejected() {
        let mut e = event();
        e.zone_id = "   ".into();
        let report = validator(false).inspect(&e);
        assert_eq!(report.errors, vec!["zone_id is required and cannot be empty"]);
    }

    #[test]
    fn overlong_identifier_is_rejected() {
        let mut e = event();
        e.reader_id = "R".repeat(51);
        let report = validator(false).inspect(&e);
        assert_eq!(report.errors, vec!["reader_id exceeds maximum length of 50"]);

        e.reader_id = "R".repeat(50);
        assert!(validator(false).inspect(&e).errors.is_empty());
    }

    #[test]
    fn future_timestamp_is_rejected() {
        let mut e = event();
        e.event_timestamp = now() + Duration::seconds(1);
        let report = validator(false).inspect(&e);
        assert!(report.errors[0].contains("in the future"));
    }

    #[test]
    fn old_events_warn() {
        let mut e = event();
        e.event_timestamp = now() - Duration::hours(3);
        let report = validator(false).inspect(&e);
        assert!(report.errors.is_empty());
        assert_eq!(report.warnings, vec!["Event is 3.0 hours old"]);

        e.event_timestamp = now() - Duration::days(31);
        let report = validator(false).inspect(&e);
        assert_eq!(report.warnings.len(), 2);
        assert!(report.warnings[0].contains("more than 30 days old"));
    }

    #[test]
    fn batch_split_preserves_order_and_reasons() {
        let mut bad = event();
        bad.signal_strength = Some(5.0);
        let mut second = event();
        second.badge_id = "BADGE-00002".into();

        let outcome = validator(false).validate_batch(vec![event(), bad, second]);
        assert_eq!(outcome.valid.len(), 2);
        assert_eq!(outcome.valid[1].badge_id, "BADGE-00002");
        assert_eq!(outcome.rejected.len(), 1);
        assert!(outcome.rejected[0].reasons[0].contains("cannot be positive"));
    }

    #[test]
    fn messages_list_errors_before_warnings() {
        let mut e = event();
        e.signal_strength = Some(-120.0);
        let (_, messages) = validator(false).validate_event(&e);
        assert!(messages[0].contains("too weak"));
        assert!(messages[1].contains("Weak signal"));
    }
}
