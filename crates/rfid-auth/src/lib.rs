//! # rfid-auth — Key-Pair Authentication
//!
//! Credentials for the streaming ingestion client. The service
//! authenticates callers by RSA key pair: the public key is registered on
//! the user, and every session starts with a JWT signed by the private key.
//!
//! - [`KeyMaterial`] loads the private key (PEM, encrypted PEM or DER) and
//!   derives the `SHA256:` public-key fingerprint.
//! - [`TokenIssuer`] signs RS256 identity assertions and caches them until
//!   they come within five minutes of expiry.
//! - [`generate_keypair`] writes a new key pair for onboarding.
//!
//! ## Crate Policy
//!
//! - Private keys and signed assertions never appear in `Debug` output or
//!   log fields.
//! - No network I/O; the exchange of assertions for scoped tokens lives in
//!   `rfid-streaming`.
//! - Every error is fatal to the caller. Nothing here retries.

pub mod error;
pub mod key;
pub mod keygen;
pub mod token;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use error::CredentialError;
pub use key::{KeyMaterial, MIN_KEY_BITS};
pub use keygen::{generate_keypair, pem_body, GeneratedKeyPair};
pub use token::{
    Claims, IdentityAssertion, IssuerConfig, TokenIssuer, DEFAULT_ASSERTION_LIFETIME_SECS,
    MAX_ASSERTION_LIFETIME_SECS, REFRESH_MARGIN_SECS,
};
