//! # Identity Assertions
//!
//! A [`TokenIssuer`] signs short-lived RS256 JWTs that prove possession of
//! the registered private key. The ingestion service accepts them on the
//! discovery and token-exchange endpoints.
//!
//! ## Claims
//!
//! | Claim | Value |
//! |-------|-------|
//! | `iss` | `ACCOUNT.USER.SHA256:<fingerprint>` |
//! | `sub` | `ACCOUNT.USER` |
//! | `iat` | issue time (seconds since epoch) |
//! | `exp` | `iat` + lifetime, at most one hour |
//! | `aud` | optional, only when configured |
//!
//! The JOSE header carries `kid` set to the key fingerprint.
//!
//! ## Refresh Policy
//!
//! [`TokenIssuer::current`] hands out the cached assertion while more than
//! the refresh margin (five minutes) of validity remains, and issues a new
//! one otherwise. Issuance happens under the cache lock, so concurrent
//! callers that find the cache stale wait for a single refresh rather than
//! signing in parallel. There are no background timers: staleness is
//! evaluated lazily against the injected [`Clock`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, Header};
use parking_lot::Mutex;
use rfid_core::{Clock, SystemClock};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::CredentialError;
use crate::key::KeyMaterial;

/// Longest lifetime the ingestion service accepts for an assertion.
pub const MAX_ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Lifetime used when none is configured.
pub const DEFAULT_ASSERTION_LIFETIME_SECS: i64 = 59 * 60;

/// Remaining validity below which a cached assertion is replaced.
pub const REFRESH_MARGIN_SECS: i64 = 5 * 60;

// ── Claims ─────────────────────────────────────────────────────────────

/// JWT claim set for an identity assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

// ── IdentityAssertion ──────────────────────────────────────────────────

/// A signed identity assertion.
///
/// The compact JWT is zeroized on drop and redacted from `Debug`.
#[derive(Clone)]
pub struct IdentityAssertion {
    token: Zeroizing<String>,
    subject: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl fmt::Debug for IdentityAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityAssertion")
            .field("token", &"[REDACTED]")
            .field("subject", &self.subject)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl IdentityAssertion {
    /// The compact JWT, for use as a bearer credential.
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// The `sub` claim.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Validity left at `now`; negative once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }
}

// ── Configuration ──────────────────────────────────────────────────────

/// Tunables for a [`TokenIssuer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerConfig {
    /// Validity window of each assertion.
    pub lifetime: Duration,
    /// Cached assertions with less than this left are replaced.
    pub refresh_margin: Duration,
    /// Optional `aud` claim.
    pub audience: Option<String>,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::seconds(DEFAULT_ASSERTION_LIFETIME_SECS),
            refresh_margin: Duration::seconds(REFRESH_MARGIN_SECS),
            audience: None,
        }
    }
}

impl IssuerConfig {
    fn validate(&self) -> Result<(), CredentialError> {
        let secs = self.lifetime.num_seconds();
        if secs <= 0 {
            return Err(CredentialError::InvalidLifetime(format!(
                "lifetime must be positive, got {secs}s"
            )));
        }
        if secs > MAX_ASSERTION_LIFETIME_SECS {
            return Err(CredentialError::ExpiryTooLong {
                requested_secs: secs as u64,
                max_secs: MAX_ASSERTION_LIFETIME_SECS as u64,
            });
        }
        if self.lifetime <= self.refresh_margin {
            return Err(CredentialError::InvalidLifetime(format!(
                "lifetime of {secs}s does not exceed the refresh margin of {}s",
                self.refresh_margin.num_seconds()
            )));
        }
        Ok(())
    }
}

// ── TokenIssuer ────────────────────────────────────────────────────────

/// Signs and caches identity assertions for one account/user pair.
pub struct TokenIssuer {
    key: Arc<KeyMaterial>,
    qualified_user: String,
    issuer_claim: String,
    config: IssuerConfig,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<IdentityAssertion>>,
    issued: AtomicU64,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("subject", &self.qualified_user)
            .field("fingerprint", &self.key.fingerprint())
            .field("config", &self.config)
            .finish()
    }
}

impl TokenIssuer {
    /// Create an issuer with the given lifetime and the default margin.
    ///
    /// # Errors
    ///
    /// [`CredentialError::ExpiryTooLong`] above one hour,
    /// [`CredentialError::InvalidLifetime`] for non-positive lifetimes or
    /// lifetimes not exceeding the refresh margin.
    pub fn new(
        key: Arc<KeyMaterial>,
        account: &str,
        user: &str,
        lifetime: Duration,
    ) -> Result<Self, CredentialError> {
        Self::with_config(
            key,
            account,
            user,
            IssuerConfig {
                lifetime,
                ..IssuerConfig::default()
            },
        )
    }

    /// Create an issuer from a full [`IssuerConfig`].
    pub fn with_config(
        key: Arc<KeyMaterial>,
        account: &str,
        user: &str,
        config: IssuerConfig,
    ) -> Result<Self, CredentialError> {
        config.validate()?;
        let qualified_user = format!("{account}.{user}").to_uppercase();
        let issuer_claim = format!("{qualified_user}.{}", key.fingerprint());
        Ok(Self {
            key,
            qualified_user,
            issuer_claim,
            config,
            clock: Arc::new(SystemClock),
            cached: Mutex::new(None),
            issued: AtomicU64::new(0),
        })
    }

    /// Replace the clock used for `iat`/`exp` and staleness checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// `ACCOUNT.USER`, as placed in `sub`.
    pub fn subject(&self) -> &str {
        &self.qualified_user
    }

    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    /// Sign a fresh assertion without touching the cache.
    pub fn issue(&self) -> Result<IdentityAssertion, CredentialError> {
        let now = self.clock.now();
        let expires_at = now + self.config.lifetime;
        let claims = Claims {
            iss: self.issuer_claim.clone(),
            sub: self.qualified_user.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            aud: self.config.audience.clone(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.key.fingerprint().to_string());

        let token = jsonwebtoken::encode(&header, &claims, self.key.encoding_key())?;
        self.issued.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            subject = %self.qualified_user,
            expires_at = %expires_at,
            "issued identity assertion"
        );

        Ok(IdentityAssertion {
            token: Zeroizing::new(token),
            subject: self.qualified_user.clone(),
            issued_at: now,
            expires_at,
        })
    }

    /// The cached assertion, or a fresh one if it is inside the refresh
    /// margin.
    pub fn current(&self) -> Result<IdentityAssertion, CredentialError> {
        let mut cached = self.cached.lock();
        let now = self.clock.now();
        if let Some(assertion) = cached.as_ref() {
            if assertion.remaining(now) > self.config.refresh_margin {
                return Ok(assertion.clone());
            }
        }
        let fresh = self.issue()?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    /// Drop the cached assertion so the next [`current`](Self::current)
    /// signs a new one.
    pub fn invalidate(&self) {
        *self.cached.lock() = None;
    }

    /// Number of assertions signed so far.
    pub fn issued_count(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}
