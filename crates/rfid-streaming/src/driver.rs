//! # Ingestion Driver
//!
//! Paces batches from a [`RecordSource`] through a [`BatchValidator`] into
//! a [`BatchSink`] at a fixed rate.
//!
//! ## Pacing
//!
//! `batch_interval = batch_size / events_per_second`. Batch `i` is due at
//! `start + i * batch_interval`; the driver sleeps until the next deadline
//! after each batch except the last, so `n` batches take at least
//! `(n - 1) * batch_interval`. A slow append eats into the following sleep
//! rather than shifting every later deadline.
//!
//! ## Limits
//!
//! | Limit | Batches | Event timestamps |
//! |-------|---------|------------------|
//! | `Duration(d)` | `max(1, ceil(d / interval))` | backfilled across the `d` before now |
//! | `Batches(n)` | `n` | wall clock at each batch |
//! | `Unbounded` | until cancelled | wall clock at each batch |
//!
//! Every batch start sits [`BATCH_SPREAD`] earlier than the table says so
//! that no event in the batch lands in the future.
//!
//! ## Stopping
//!
//! Cancellation is observed between batches and during the pacing sleep,
//! never in the middle of an append. An append failure ends the run with a
//! [`RunError`] whose summary covers only the batches that succeeded.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rfid_core::{BadgeEvent, BatchValidator, Clock, DataQualityValidator, RecordSource, SystemClock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::channel::ChannelSession;
use crate::error::StreamingError;

/// Events between progress log lines.
pub const PROGRESS_LOG_EVERY: u64 = 10_000;

/// Sources spread a batch over up to this long after its start instant, so
/// batch starts are placed this far before the instant they must not pass.
pub const BATCH_SPREAD: Duration = Duration::from_secs(1);

/// Destination for validated batches.
pub trait BatchSink {
    /// Name used in log fields.
    fn sink_name(&self) -> &str;

    /// Deliver one batch. Implementations must leave their state untouched
    /// on failure.
    fn append_batch(
        &mut self,
        batch: &[BadgeEvent],
    ) -> impl Future<Output = Result<(), StreamingError>> + Send;
}

impl BatchSink for ChannelSession {
    fn sink_name(&self) -> &str {
        self.channel_name()
    }

    async fn append_batch(&mut self, batch: &[BadgeEvent]) -> Result<(), StreamingError> {
        self.append(batch).await.map(|_| ())
    }
}

/// How long a run lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLimit {
    /// Cover a window of this length ending now, with backfilled timestamps.
    Duration(Duration),
    /// Send exactly this many batches.
    Batches(u64),
    /// Run until cancelled.
    Unbounded,
}

/// Driver settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    pub batch_size: usize,
    pub events_per_second: f64,
    pub strict_validation: bool,
    pub limit: RunLimit,
}

/// Outcome counters for a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub events_sent: u64,
    pub events_rejected: u64,
    pub batches_sent: u64,
    pub elapsed: Duration,
    /// Whether the run ended because cancellation was requested.
    pub cancelled: bool,
}

impl RunSummary {
    /// Events sent per second of elapsed time.
    pub fn average_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.events_sent as f64 / secs
        } else {
            0.0
        }
    }
}

/// A run that stopped on an error, with what it achieved before that.
#[derive(Debug, thiserror::Error)]
#[error("ingestion stopped after {} batches ({} events): {error}", .summary.batches_sent, .summary.events_sent)]
pub struct RunError {
    #[source]
    pub error: StreamingError,
    pub summary: RunSummary,
}

/// Paces record batches into a sink.
#[derive(Debug, Clone)]
pub struct IngestionDriver {
    config: DriverConfig,
    interval: Duration,
    clock: Arc<dyn Clock>,
}

impl IngestionDriver {
    /// Validate the pacing parameters.
    ///
    /// # Errors
    ///
    /// [`StreamingError::InvalidRate`] when the batch interval is not a
    /// positive, finite duration.
    pub fn new(config: DriverConfig) -> Result<Self, StreamingError> {
        let invalid = || StreamingError::InvalidRate {
            batch_size: config.batch_size,
            events_per_second: config.events_per_second,
        };
        if config.batch_size == 0
            || !config.events_per_second.is_finite()
            || config.events_per_second <= 0.0
        {
            return Err(invalid());
        }
        let secs = config.batch_size as f64 / config.events_per_second;
        let interval = Duration::try_from_secs_f64(secs).map_err(|_| invalid())?;
        if interval.is_zero() {
            return Err(invalid());
        }

        Ok(Self {
            config,
            interval,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the clock used for event timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn batch_interval(&self) -> Duration {
        self.interval
    }

    /// Batches the configured limit allows, or `None` when unbounded.
    pub fn total_batches(&self) -> Option<u64> {
        match self.config.limit {
            RunLimit::Duration(window) => {
                let batches = (window.as_secs_f64() / self.interval.as_secs_f64()).ceil();
                Some((batches as u64).max(1))
            }
            RunLimit::Batches(n) => Some(n),
            RunLimit::Unbounded => None,
        }
    }

    /// A validator honouring `strict_validation`, on the driver's clock.
    pub fn default_validator(&self) -> DataQualityValidator {
        DataQualityValidator::with_clock(self.config.strict_validation, Arc::clone(&self.clock))
    }

    /// Drive batches until the limit is reached, cancellation is requested,
    /// or an append fails.
    pub async fn run<R, V, S>(
        &self,
        source: &mut R,
        validator: &V,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, RunError>
    where
        R: RecordSource + ?Sized,
        V: BatchValidator + ?Sized,
        S: BatchSink + ?Sized,
    {
        let total = self.total_batches();
        let spread = chrono::Duration::milliseconds(BATCH_SPREAD.as_millis() as i64);
        let backfill_start = match self.config.limit {
            RunLimit::Duration(window) => chrono::Duration::from_std(window)
                .ok()
                .map(|w| self.clock.now() - w - spread),
            _ => None,
        };
        let interval_ms = self.interval.as_secs_f64() * 1000.0;

        tracing::info!(
            channel = %sink.sink_name(),
            batch_size = self.config.batch_size,
            events_per_second = self.config.events_per_second,
            batch_interval = ?self.interval,
            total_batches = ?total,
            "starting ingestion"
        );

        let started = Instant::now();
        let mut summary = RunSummary::default();
        let mut index: u64 = 0;
        let mut next_progress = PROGRESS_LOG_EVERY;

        loop {
            if total.is_some_and(|t| index >= t) {
                break;
            }
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let timestamp = match backfill_start {
                Some(start) => {
                    start + chrono::Duration::milliseconds((interval_ms * index as f64) as i64)
                }
                None => self.clock.now() - spread,
            };
            let batch = source.next_batch(self.config.batch_size, timestamp);
            let outcome = validator.validate_batch(batch);
            for rejected in &outcome.rejected {
                tracing::debug!(
                    badge_id = %rejected.event.badge_id,
                    reasons = ?rejected.reasons,
                    "rejected event"
                );
            }
            if !outcome.rejected.is_empty() {
                tracing::warn!(
                    channel = %sink.sink_name(),
                    rejected = outcome.rejected.len(),
                    batch = index,
                    "batch contained invalid events"
                );
            }

            if !outcome.valid.is_empty() {
                if let Err(error) = sink.append_batch(&outcome.valid).await {
                    summary.elapsed = started.elapsed();
                    tracing::error!(
                        channel = %sink.sink_name(),
                        batch = index,
                        events_sent = summary.events_sent,
                        "append failed: {error}"
                    );
                    return Err(RunError { error, summary });
                }
            }
            summary.events_sent += outcome.valid.len() as u64;
            summary.events_rejected += outcome.rejected.len() as u64;
            summary.batches_sent += 1;
            index += 1;

            if summary.events_sent >= next_progress {
                tracing::info!(
                    channel = %sink.sink_name(),
                    events_sent = summary.events_sent,
                    events_rejected = summary.events_rejected,
                    "progress"
                );
                next_progress = (summary.events_sent / PROGRESS_LOG_EVERY + 1) * PROGRESS_LOG_EVERY;
            }

            if total.is_some_and(|t| index >= t) {
                break;
            }

            let deadline = started + self.interval.mul_f64(index as f64);
            tokio::select! {
                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                _ = tokio::time::sleep_until(deadline) => {}
            }
        }

        summary.elapsed = started.elapsed();
        tracing::info!(
            channel = %sink.sink_name(),
            events_sent = summary.events_sent,
            events_rejected = summary.events_rejected,
            batches = summary.batches_sent,
            elapsed = ?summary.elapsed,
            average_rate = summary.average_rate(),
            cancelled = summary.cancelled,
            "ingestion finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use rfid_core::{BadgeEventGenerator, Direction, GeneratorConfig, ManualClock};

    /// Records what it receives; fails the call numbered `fail_on`.
    #[derive(Default)]
    struct RecordingSink {
        batches: Vec<Vec<BadgeEvent>>,
        tokens: Vec<String>,
        fail_on: Option<usize>,
        calls: usize,
    }

    impl BatchSink for RecordingSink {
        fn sink_name(&self) -> &str {
            "recording"
        }

        async fn append_batch(&mut self, batch: &[BadgeEvent]) -> Result<(), StreamingError> {
            self.calls += 1;
            if self.fail_on == Some(self.calls) {
                return Err(StreamingError::AppendFailed {
                    channel: "recording".into(),
                    status: 500,
                    body: "internal error".into(),
                });
            }
            self.batches.push(batch.to_vec());
            self.tokens.push(format!("token-{}", self.calls));
            Ok(())
        }
    }

    /// Emits events with a fixed signal strength.
    struct FixedSource {
        signal: f64,
        starts: Vec<DateTime<Utc>>,
    }

    impl RecordSource for FixedSource {
        fn next_batch(&mut self, count: usize, start: DateTime<Utc>) -> Vec<BadgeEvent> {
            self.starts.push(start);
            (0..count)
                .map(|i| BadgeEvent {
                    badge_id: format!("BADGE-{i:05}"),
                    user_id: format!("USR-{i:03}"),
                    zone_id: "ZONE-LOBBY-1".into(),
                    reader_id: "RDR-001".into(),
                    event_timestamp: start,
                    signal_strength: Some(self.signal),
                    direction: Some(Direction::Entry),
                })
                .collect()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()
    }

    fn driver(batch_size: usize, eps: f64, limit: RunLimit) -> IngestionDriver {
        IngestionDriver::new(DriverConfig {
            batch_size,
            events_per_second: eps,
            strict_validation: false,
            limit,
        })
        .unwrap()
        .with_clock(Arc::new(ManualClock::new(now())))
    }

    #[test]
    fn interval_is_batch_size_over_rate() {
        let d = driver(100, 50.0, RunLimit::Batches(3));
        assert_eq!(d.batch_interval(), Duration::from_secs(2));
    }

    #[test]
    fn non_positive_or_non_finite_rates_are_rejected() {
        for (batch_size, eps) in [(100, 0.0), (100, -5.0), (100, f64::NAN), (100, f64::INFINITY), (0, 10.0)] {
            let err = IngestionDriver::new(DriverConfig {
                batch_size,
                events_per_second: eps,
                strict_validation: false,
                limit: RunLimit::Unbounded,
            })
            .unwrap_err();
            assert!(matches!(err, StreamingError::InvalidRate { .. }), "{batch_size}/{eps}");
        }
    }

    #[test]
    fn duration_limit_rounds_up_to_whole_batches() {
        // 10 s at 2 s per batch = 5 batches; 11 s needs a sixth.
        assert_eq!(driver(100, 50.0, RunLimit::Duration(Duration::from_secs(10))).total_batches(), Some(5));
        assert_eq!(driver(100, 50.0, RunLimit::Duration(Duration::from_secs(11))).total_batches(), Some(6));
        assert_eq!(driver(100, 50.0, RunLimit::Duration(Duration::from_millis(1))).total_batches(), Some(1));
        assert_eq!(driver(100, 50.0, RunLimit::Unbounded).total_batches(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn three_batches_are_paced_two_seconds_apart() {
        let d = driver(100, 50.0, RunLimit::Batches(3));
        let mut source = BadgeEventGenerator::seeded(GeneratorConfig::default(), 3).unwrap();
        let mut sink = RecordingSink::default();
        let validator = d.default_validator();

        let summary = d
            .run(&mut source, &validator, &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.events_sent, 300);
        assert_eq!(summary.batches_sent, 3);
        assert_eq!(sink.tokens.last().map(String::as_str), Some("token-3"));
        assert!(summary.elapsed >= Duration::from_secs(4));
        assert!(summary.elapsed < Duration::from_secs(6));
        assert!(!summary.cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn positive_signal_is_never_appended() {
        let d = driver(10, 100.0, RunLimit::Batches(2));
        let mut source = FixedSource {
            signal: 5.0,
            starts: Vec::new(),
        };
        let mut sink = RecordingSink::default();
        let validator = d.default_validator();

        let summary = d
            .run(&mut source, &validator, &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.events_sent, 0);
        assert_eq!(summary.events_rejected, 20);
        assert_eq!(sink.calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn append_failure_stops_with_prior_counts() {
        let d = driver(100, 50.0, RunLimit::Batches(5));
        let mut source = BadgeEventGenerator::seeded(GeneratorConfig::default(), 4).unwrap();
        let mut sink = RecordingSink {
            fail_on: Some(3),
            ..RecordingSink::default()
        };
        let validator = d.default_validator();

        let err = d
            .run(&mut source, &validator, &mut sink, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err.error, StreamingError::AppendFailed { status: 500, .. }));
        assert_eq!(err.summary.events_sent, 200);
        assert_eq!(err.summary.batches_sent, 2);
        assert_eq!(sink.calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn duration_limit_backfills_timestamps() {
        let d = driver(100, 50.0, RunLimit::Duration(Duration::from_secs(6)));
        let mut source = FixedSource {
            signal: -50.0,
            starts: Vec::new(),
        };
        let mut sink = RecordingSink::default();
        let validator = d.default_validator();

        d.run(&mut source, &validator, &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        let expected: Vec<_> = (0..3)
            .map(|i| now() - chrono::Duration::seconds(7) + chrono::Duration::seconds(2 * i))
            .collect();
        assert_eq!(source.starts, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_pacing_sleep() {
        let d = driver(10, 1.0, RunLimit::Unbounded);
        let mut source = BadgeEventGenerator::seeded(GeneratorConfig::default(), 5).unwrap();
        let mut sink = RecordingSink::default();
        let validator = d.default_validator();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            trigger.cancel();
        });

        let summary = d.run(&mut source, &validator, &mut sink, &cancel).await.unwrap();
        assert!(summary.cancelled);
        // Batches at t = 0, 10 and 20 s; cancelled while sleeping toward 30 s.
        assert_eq!(summary.batches_sent, 3);
        assert_eq!(summary.events_sent, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_sends_nothing() {
        let d = driver(10, 10.0, RunLimit::Batches(4));
        let mut source = BadgeEventGenerator::seeded(GeneratorConfig::default(), 6).unwrap();
        let mut sink = RecordingSink::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = d
            .run(&mut source, &d.default_validator(), &mut sink, &cancel)
            .await
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.batches_sent, 0);
    }
}
