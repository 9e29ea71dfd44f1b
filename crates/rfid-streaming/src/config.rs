//! Streaming client configuration.
//!
//! Identifies the account, the user whose key signs assertions, and the
//! pipe that receives rows. The account URL defaults to the public
//! endpoint derived from the account identifier; override it for private
//! connectivity or for tests against a local mock.

use std::time::Duration;

use url::Url;

/// Default bound on discovery, exchange, open, status and drop calls.
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(15);
/// Default bound on append calls.
pub const DEFAULT_APPEND_TIMEOUT: Duration = Duration::from_secs(30);
/// Default age after which a channel renegotiates its scoped token.
pub const DEFAULT_SCOPED_TOKEN_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Configuration for a [`StreamingClient`](crate::StreamingClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingConfig {
    /// Account identifier, e.g. `MYORG-MYACCOUNT`.
    pub account: String,
    /// User the public key is registered on.
    pub user: String,
    /// Base URL for discovery and token exchange.
    pub account_url: Url,
    pub database: String,
    pub schema: String,
    pub pipe: String,
    pub control_timeout: Duration,
    pub append_timeout: Duration,
    /// Scoped tokens older than this are renegotiated before the next append.
    pub scoped_token_lifetime: Duration,
    pub user_agent: String,
}

impl StreamingConfig {
    /// Create a configuration with the default account URL and timeouts.
    pub fn new(
        account: impl Into<String>,
        user: impl Into<String>,
        database: impl Into<String>,
        schema: impl Into<String>,
        pipe: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let account = account.into();
        let config = Self {
            account_url: default_account_url(&account)?,
            account,
            user: user.into(),
            database: database.into(),
            schema: schema.into(),
            pipe: pipe.into(),
            control_timeout: DEFAULT_CONTROL_TIMEOUT,
            append_timeout: DEFAULT_APPEND_TIMEOUT,
            scoped_token_lifetime: DEFAULT_SCOPED_TOKEN_LIFETIME,
            user_agent: format!("rfid-sim/{}", env!("CARGO_PKG_VERSION")),
        };
        config.validate()?;
        Ok(config)
    }

    /// Replace the account URL.
    pub fn with_account_url(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.account_url = parse_url("account_url", raw)?;
        Ok(self)
    }

    /// A configuration pointing discovery and exchange at a local mock
    /// server (for testing).
    pub fn local_mock(base_url: &str) -> Result<Self, ConfigError> {
        let mut config = Self::new(
            "test_account",
            "test_user",
            "SNOWFLAKE_EXAMPLE",
            "STAGE_BADGE_TRACKING",
            "BADGE_EVENTS_PIPE",
        )?
        .with_account_url(base_url)?;
        config.control_timeout = Duration::from_secs(5);
        config.append_timeout = Duration::from_secs(5);
        Ok(config)
    }

    /// Check that every identifier is usable as a URL path segment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_identifier("account", &self.account)?;
        validate_identifier("user", &self.user)?;
        validate_identifier("database", &self.database)?;
        validate_identifier("schema", &self.schema)?;
        validate_identifier("pipe", &self.pipe)?;
        if self.control_timeout.is_zero() || self.append_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "timeout",
                reason: "timeouts must be positive".into(),
            });
        }
        Ok(())
    }
}

/// `https://{account}.snowflakecomputing.com`, with the account lowercased
/// and underscores replaced by hyphens.
pub fn default_account_url(account: &str) -> Result<Url, ConfigError> {
    let host = account.trim().replace('_', "-").to_lowercase();
    if host.is_empty() {
        return Err(ConfigError::MissingValue("account"));
    }
    parse_url("account", &format!("https://{host}.snowflakecomputing.com"))
}

/// Reject identifiers that would alter the request path.
pub fn validate_identifier(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingValue(field));
    }
    if value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '%'))
    {
        return Err(ConfigError::InvalidValue {
            field,
            reason: format!("{value:?} contains characters not allowed in a URL path segment"),
        });
    }
    Ok(())
}

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(field.to_string(), e.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    MissingValue(&'static str),
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_account_url_normalizes_account() {
        let url = default_account_url("MyOrg_Prod-Acct").unwrap();
        assert_eq!(url.as_str(), "https://myorg-prod-acct.snowflakecomputing.com/");
    }

    #[test]
    fn new_applies_defaults() {
        let cfg = StreamingConfig::new("acct", "user", "DB", "SCH", "PIPE").unwrap();
        assert_eq!(cfg.control_timeout, Duration::from_secs(15));
        assert_eq!(cfg.append_timeout, Duration::from_secs(30));
        assert_eq!(cfg.scoped_token_lifetime, Duration::from_secs(1800));
        assert!(cfg.user_agent.starts_with("rfid-sim/"));
    }

    #[test]
    fn local_mock_builds_valid_config() {
        let cfg = StreamingConfig::local_mock("http://127.0.0.1:9000").unwrap();
        assert_eq!(cfg.account_url.as_str(), "http://127.0.0.1:9000/");
        assert_eq!(cfg.control_timeout, Duration::from_secs(5));
    }

    #[test]
    fn path_breaking_identifiers_are_rejected() {
        let err = StreamingConfig::new("acct", "user", "DB", "a/b", "PIPE").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "schema", .. }));
        let err = StreamingConfig::new("acct", "user", "", "SCH", "PIPE").unwrap_err();
        assert!(matches!(err, ConfigError::MissingValue("database")));
    }

    #[test]
    fn invalid_account_url_is_rejected() {
        let cfg = StreamingConfig::new("acct", "user", "DB", "SCH", "PIPE").unwrap();
        assert!(cfg.with_account_url("not a url").is_err());
    }
}
