//! # Synthetic Badge Events
//!
//! [`BadgeEventGenerator`] fabricates plausible scans from fixed pools of
//! badges, users, zones and readers. Each user carries exactly one badge.
//! Zones are spread evenly over five zone types.
//!
//! Signal strength is drawn uniformly from a band every reader can
//! produce; the direction is omitted for roughly one scan in ten, matching
//! readers that do not report it.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::CoreError;
use crate::event::{BadgeEvent, Direction};
use crate::source::RecordSource;

/// Zone categories, in the order their identifiers are allocated.
pub const ZONE_TYPES: [&str; 5] = ["LOBBY", "OFFICE", "CONF", "SECURE", "PARKING"];

const SIGNAL_RANGE_DBM: std::ops::RangeInclusive<f64> = -75.0..=-30.0;
const DIRECTION_REPORTED_PROBABILITY: f64 = 0.9;

/// Pool sizes for the generator.
///
/// Zones are allocated in equal shares per zone type, so `num_zones` is
/// rounded down to a multiple of five: 52 yields 50 zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorConfig {
    pub num_users: usize,
    pub num_zones: usize,
    pub num_readers: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            num_users: 500,
            num_zones: 50,
            num_readers: 25,
        }
    }
}

/// Generates synthetic badge scans.
#[derive(Debug)]
pub struct BadgeEventGenerator {
    users: Vec<(String, String)>,
    zone_ids: Vec<String>,
    reader_ids: Vec<String>,
    rng: StdRng,
}

impl BadgeEventGenerator {
    /// Create a generator seeded from the operating system.
    pub fn new(config: GeneratorConfig) -> Result<Self, CoreError> {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create a reproducible generator.
    pub fn seeded(config: GeneratorConfig, seed: u64) -> Result<Self, CoreError> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: GeneratorConfig, rng: StdRng) -> Result<Self, CoreError> {
        if config.num_users == 0 {
            return Err(CoreError::InvalidGenerator(
                "num_users must be at least 1".into(),
            ));
        }
        if config.num_zones < ZONE_TYPES.len() {
            return Err(CoreError::InvalidGenerator(format!(
                "num_zones must be at least {} (one per zone type), got {}",
                ZONE_TYPES.len(),
                config.num_zones
            )));
        }
        if config.num_readers == 0 {
            return Err(CoreError::InvalidGenerator(
                "num_readers must be at least 1".into(),
            ));
        }

        let users = (1..=config.num_users)
            .map(|i| (format!("USR-{i:03}"), format!("BADGE-{i:05}")))
            .collect();
        let per_type = config.num_zones / ZONE_TYPES.len();
        let zone_ids: Vec<String> = ZONE_TYPES
            .iter()
            .flat_map(|t| (1..=per_type).map(move |i| format!("ZONE-{t}-{i}")))
            .collect();
        let reader_ids: Vec<String> = (1..=config.num_readers)
            .map(|i| format!("RDR-{i:03}"))
            .collect();

        if zone_ids.len() != config.num_zones {
            tracing::debug!(
                requested = config.num_zones,
                allocated = zone_ids.len(),
                "zone count rounded down to a multiple of the zone types"
            );
        }

        Ok(Self {
            users,
            zone_ids,
            reader_ids,
            rng,
        })
    }

    /// Generate one scan at `timestamp`.
    pub fn generate_event(&mut self, timestamp: DateTime<Utc>) -> BadgeEvent {
        // Pools are non-empty by construction.
        let (user_id, badge_id) = self.users[self.rng.gen_range(0..self.users.len())].clone();
        let zone_id = self.zone_ids[self.rng.gen_range(0..self.zone_ids.len())].clone();
        let reader_id = self.reader_ids[self.rng.gen_range(0..self.reader_ids.len())].clone();
        let signal = self.rng.gen_range(SIGNAL_RANGE_DBM);
        let direction = if self.rng.gen_bool(DIRECTION_REPORTED_PROBABILITY) {
            Some(if self.rng.gen_bool(0.5) {
                Direction::Entry
            } else {
                Direction::Exit
            })
        } else {
            None
        };

        BadgeEvent {
            badge_id,
            user_id,
            zone_id,
            reader_id,
            event_timestamp: timestamp,
            signal_strength: Some((signal * 10.0).round() / 10.0),
            direction,
        }
    }

    /// Generate `count` scans spread across one second starting at `start`.
    pub fn generate_batch(&mut self, count: usize, start: DateTime<Utc>) -> Vec<BadgeEvent> {
        (0..count)
            .map(|i| {
                let offset_ms = (i * 1000 / count) as i64;
                self.generate_event(start + Duration::milliseconds(offset_ms))
            })
            .collect()
    }

    /// Number of distinct zones in the pool.
    pub fn zone_count(&self) -> usize {
        self.zone_ids.len()
    }
}

impl RecordSource for BadgeEventGenerator {
    fn next_batch(&mut self, count: usize, start: DateTime<Utc>) -> Vec<BadgeEvent> {
        self.generate_batch(count, start)
    }
}
