//! # Simulator Configuration
//!
//! Settings are layered: built-in defaults, then an optional YAML file,
//! then environment variables, then command-line flags. The result is
//! checked once by [`SimulatorConfig::validate`], which produces the
//! immutable [`ValidatedConfig`] every other component is built from.
//!
//! ## Environment Variables
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `SNOWFLAKE_ACCOUNT` | `account` | required |
//! | `SNOWFLAKE_USER` | `user` | required |
//! | `SNOWFLAKE_PRIVATE_KEY_PATH` | `private_key_path` | required |
//! | `SNOWFLAKE_PRIVATE_KEY_PASSPHRASE` | `private_key_passphrase` | none |
//! | `SNOWFLAKE_ACCOUNT_URL` | `account_url` | derived from the account |
//! | `SNOWFLAKE_DATABASE` | `database` | `SNOWFLAKE_EXAMPLE` |
//! | `SNOWFLAKE_SCHEMA` | `schema` | `STAGE_BADGE_TRACKING` |
//! | `SNOWFLAKE_PIPE` | `pipe` | `BADGE_EVENTS_PIPE` |
//! | `CHANNEL_NAME` | `channel_name` | `rfid_channel_001` |
//! | `EVENTS_PER_SECOND` | `events_per_second` | 100 |
//! | `SIMULATION_DURATION_DAYS` | `duration_days` | 10 |
//! | `BATCH_SIZE` | `batch_size` | 100 |
//! | `STRICT_VALIDATION` | `strict_validation` | false |
//! | `NUM_USERS` | `num_users` | 500 |
//! | `NUM_ZONES` | `num_zones` | 50 |
//! | `NUM_READERS` | `num_readers` | 25 |
//! | `CONTROL_TIMEOUT_SECS` | `control_timeout_secs` | 15 |
//! | `APPEND_TIMEOUT_SECS` | `append_timeout_secs` | 30 |
//! | `NUM_CHANNELS` | `num_channels` | 1 |
//!
//! Empty variables count as unset.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rfid_core::GeneratorConfig;
use rfid_streaming::{DriverConfig, RunLimit, StreamingConfig};
use serde::Deserialize;
use zeroize::Zeroizing;

pub const DEFAULT_DATABASE: &str = "SNOWFLAKE_EXAMPLE";
pub const DEFAULT_SCHEMA: &str = "STAGE_BADGE_TRACKING";
pub const DEFAULT_PIPE: &str = "BADGE_EVENTS_PIPE";
pub const DEFAULT_CHANNEL_NAME: &str = "rfid_channel_001";

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Errors raised while loading or checking configuration.
#[derive(Debug, thiserror::Error)]
pub enum SimConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(
        "failed to parse config file {path} as YAML (`KEY=value` env files are not read; \
         export those as environment variables instead): {source}"
    )]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("{0} is required")]
    MissingValue(&'static str),

    #[error("invalid value for {variable}: {value:?} ({reason})")]
    InvalidValue {
        variable: &'static str,
        value: String,
        reason: String,
    },

    #[error("private key file not found: {}", .0.display())]
    KeyFileNotFound(PathBuf),

    #[error(transparent)]
    Streaming(#[from] rfid_streaming::ConfigError),
}

/// Raw, unvalidated settings.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulatorConfig {
    pub account: Option<String>,
    pub user: Option<String>,
    pub private_key_path: Option<PathBuf>,
    pub private_key_passphrase: Option<String>,
    pub account_url: Option<String>,
    pub database: String,
    pub schema: String,
    pub pipe: String,
    pub channel_name: String,
    pub events_per_second: f64,
    pub duration_days: u32,
    pub batch_size: usize,
    pub strict_validation: bool,
    pub num_users: usize,
    pub num_zones: usize,
    pub num_readers: usize,
    pub control_timeout_secs: u64,
    pub append_timeout_secs: u64,
    pub num_channels: usize,
    /// Run until interrupted instead of covering `duration_days`.
    pub continuous: bool,
    /// Stop after this many batches per channel.
    pub max_batches: Option<u64>,
    /// Delete channels on the server when the run ends.
    pub drop_channel_on_exit: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        let generator = GeneratorConfig::default();
        Self {
            account: None,
            user: None,
            private_key_path: None,
            private_key_passphrase: None,
            account_url: None,
            database: DEFAULT_DATABASE.into(),
            schema: DEFAULT_SCHEMA.into(),
            pipe: DEFAULT_PIPE.into(),
            channel_name: DEFAULT_CHANNEL_NAME.into(),
            events_per_second: 100.0,
            duration_days: 10,
            batch_size: 100,
            strict_validation: false,
            num_users: generator.num_users,
            num_zones: generator.num_zones,
            num_readers: generator.num_readers,
            control_timeout_secs: rfid_streaming::config::DEFAULT_CONTROL_TIMEOUT.as_secs(),
            append_timeout_secs: rfid_streaming::config::DEFAULT_APPEND_TIMEOUT.as_secs(),
            num_channels: 1,
            continuous: false,
            max_batches: None,
            drop_channel_on_exit: false,
        }
    }
}

impl fmt::Debug for SimulatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatorConfig")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("private_key_path", &self.private_key_path)
            .field(
                "private_key_passphrase",
                &self.private_key_passphrase.as_ref().map(|_| "[REDACTED]"),
            )
            .field("account_url", &self.account_url)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("pipe", &self.pipe)
            .field("channel_name", &self.channel_name)
            .field("events_per_second", &self.events_per_second)
            .field("duration_days", &self.duration_days)
            .field("batch_size", &self.batch_size)
            .field("strict_validation", &self.strict_validation)
            .field("num_channels", &self.num_channels)
            .field("continuous", &self.continuous)
            .finish_non_exhaustive()
    }
}

impl SimulatorConfig {
    /// Defaults, overlaid with `path` when given, overlaid with the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, SimConfigError> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Read a YAML file. Missing keys take their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, SimConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SimConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw).map_err(|source| SimConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> Result<(), SimConfigError> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Overlay values from `lookup`, which maps a variable name to its
    /// value.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), SimConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("SNOWFLAKE_ACCOUNT") {
            self.account = Some(v);
        }
        if let Some(v) = get("SNOWFLAKE_USER") {
            self.user = Some(v);
        }
        if let Some(v) = get("SNOWFLAKE_PRIVATE_KEY_PATH") {
            self.private_key_path = Some(PathBuf::from(v));
        }
        // Passphrases keep surrounding whitespace.
        if let Some(v) = lookup("SNOWFLAKE_PRIVATE_KEY_PASSPHRASE").filter(|v| !v.is_empty()) {
            self.private_key_passphrase = Some(v);
        }
        if let Some(v) = get("SNOWFLAKE_ACCOUNT_URL") {
            self.account_url = Some(v);
        }
        if let Some(v) = get("SNOWFLAKE_DATABASE") {
            self.database = v;
        }
        if let Some(v) = get("SNOWFLAKE_SCHEMA") {
            self.schema = v;
        }
        if let Some(v) = get("SNOWFLAKE_PIPE") {
            self.pipe = v;
        }
        if let Some(v) = get("CHANNEL_NAME") {
            self.channel_name = v;
        }

        parse_into("EVENTS_PER_SECOND", get("EVENTS_PER_SECOND"), &mut self.events_per_second)?;
        parse_into(
            "SIMULATION_DURATION_DAYS",
            get("SIMULATION_DURATION_DAYS"),
            &mut self.duration_days,
        )?;
        parse_into("BATCH_SIZE", get("BATCH_SIZE"), &mut self.batch_size)?;
        parse_into("NUM_USERS", get("NUM_USERS"), &mut self.num_users)?;
        parse_into("NUM_ZONES", get("NUM_ZONES"), &mut self.num_zones)?;
        parse_into("NUM_READERS", get("NUM_READERS"), &mut self.num_readers)?;
        parse_into(
            "CONTROL_TIMEOUT_SECS",
            get("CONTROL_TIMEOUT_SECS"),
            &mut self.control_timeout_secs,
        )?;
        parse_into(
            "APPEND_TIMEOUT_SECS",
            get("APPEND_TIMEOUT_SECS"),
            &mut self.append_timeout_secs,
        )?;
        parse_into("NUM_CHANNELS", get("NUM_CHANNELS"), &mut self.num_channels)?;

        if let Some(v) = get("STRICT_VALIDATION") {
            self.strict_validation = parse_bool("STRICT_VALIDATION", &v)?;
        }
        Ok(())
    }

    /// Check required values and assemble the typed configuration.
    ///
    /// The event rate is not checked here; the ingestion driver rejects a
    /// bad rate when it is constructed.
    pub fn validate(&self) -> Result<ValidatedConfig, SimConfigError> {
        let account = required("SNOWFLAKE_ACCOUNT", &self.account)?;
        let user = required("SNOWFLAKE_USER", &self.user)?;
        let private_key_path = self
            .private_key_path
            .clone()
            .ok_or(SimConfigError::MissingValue("SNOWFLAKE_PRIVATE_KEY_PATH"))?;
        if !private_key_path.is_file() {
            return Err(SimConfigError::KeyFileNotFound(private_key_path));
        }

        positive("NUM_CHANNELS", self.num_channels as u64)?;
        positive("CONTROL_TIMEOUT_SECS", self.control_timeout_secs)?;
        positive("APPEND_TIMEOUT_SECS", self.append_timeout_secs)?;
        positive("NUM_USERS", self.num_users as u64)?;
        positive("NUM_ZONES", self.num_zones as u64)?;
        positive("NUM_READERS", self.num_readers as u64)?;
        if !self.continuous && self.max_batches.is_none() {
            positive("SIMULATION_DURATION_DAYS", u64::from(self.duration_days))?;
        }
        rfid_streaming::config::validate_identifier("channel_name", &self.channel_name)?;

        let mut streaming =
            StreamingConfig::new(account, user, &self.database, &self.schema, &self.pipe)?;
        if let Some(url) = &self.account_url {
            streaming = streaming.with_account_url(url)?;
        }
        streaming.control_timeout = Duration::from_secs(self.control_timeout_secs);
        streaming.append_timeout = Duration::from_secs(self.append_timeout_secs);
        streaming.validate()?;

        let limit = if self.continuous {
            RunLimit::Unbounded
        } else if let Some(n) = self.max_batches {
            RunLimit::Batches(n)
        } else {
            RunLimit::Duration(Duration::from_secs(
                u64::from(self.duration_days) * SECONDS_PER_DAY,
            ))
        };

        Ok(ValidatedConfig {
            streaming,
            private_key_path,
            private_key_passphrase: self.private_key_passphrase.clone().map(Zeroizing::new),
            channel_name: self.channel_name.clone(),
            num_channels: self.num_channels,
            driver: DriverConfig {
                batch_size: self.batch_size,
                events_per_second: self.events_per_second,
                strict_validation: self.strict_validation,
                limit,
            },
            generator: GeneratorConfig {
                num_users: self.num_users,
                num_zones: self.num_zones,
                num_readers: self.num_readers,
            },
            drop_channel_on_exit: self.drop_channel_on_exit,
        })
    }
}

/// Settings after validation. Built once and passed by reference.
#[derive(Clone)]
pub struct ValidatedConfig {
    pub streaming: StreamingConfig,
    pub private_key_path: PathBuf,
    pub private_key_passphrase: Option<Zeroizing<String>>,
    pub channel_name: String,
    pub num_channels: usize,
    pub driver: DriverConfig,
    pub generator: GeneratorConfig,
    pub drop_channel_on_exit: bool,
}

impl fmt::Debug for ValidatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedConfig")
            .field("streaming", &self.streaming)
            .field("private_key_path", &self.private_key_path)
            .field(
                "private_key_passphrase",
                &self.private_key_passphrase.as_ref().map(|_| "[REDACTED]"),
            )
            .field("channel_name", &self.channel_name)
            .field("num_channels", &self.num_channels)
            .field("driver", &self.driver)
            .field("generator", &self.generator)
            .field("drop_channel_on_exit", &self.drop_channel_on_exit)
            .finish()
    }
}

impl ValidatedConfig {
    /// Channel names for this run: the configured name for a single
    /// channel, `{name}_{index}` otherwise.
    pub fn channel_names(&self) -> Vec<String> {
        if self.num_channels == 1 {
            return vec![self.channel_name.clone()];
        }
        (0..self.num_channels)
            .map(|i| format!("{}_{i}", self.channel_name))
            .collect()
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.private_key_passphrase.as_ref().map(|p| p.as_str())
    }
}

fn required<'a>(variable: &'static str, value: &'a Option<String>) -> Result<&'a str, SimConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(SimConfigError::MissingValue(variable)),
    }
}

fn positive(variable: &'static str, value: u64) -> Result<(), SimConfigError> {
    if value == 0 {
        return Err(SimConfigError::InvalidValue {
            variable,
            value: value.to_string(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(())
}

fn parse_into<T>(variable: &'static str, raw: Option<String>, slot: &mut T) -> Result<(), SimConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    if let Some(raw) = raw {
        *slot = raw.parse().map_err(|e: T::Err| SimConfigError::InvalidValue {
            variable,
            value: raw.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

fn parse_bool(variable: &'static str, raw: &str) -> Result<bool, SimConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(SimConfigError::InvalidValue {
            variable,
            value: raw.to_string(),
            reason: "expected true or false".into(),
        }),
    }
}
