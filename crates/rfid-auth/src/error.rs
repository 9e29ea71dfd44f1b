//! # Credential Error Types
//!
//! Structured errors for key loading, identity-assertion issuance and
//! key-pair generation. Every variant is fatal: a credential problem is
//! surfaced at startup and never retried.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from credential operations.
#[derive(Error, Debug)]
pub enum CredentialError {
    /// The private key path does not resolve to a file.
    #[error("private key file not found: {}", .path.display())]
    KeyNotFound {
        /// The path that was tried.
        path: PathBuf,
    },

    /// The bytes do not parse as an RSA private key.
    #[error("invalid private key ({origin}): {reason}")]
    KeyFormat {
        /// File path or `<inline>` for in-memory keys.
        origin: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// A passphrase was supplied for an unencrypted key, omitted for an
    /// encrypted one, or failed to decrypt the key.
    #[error("private key passphrase mismatch ({origin}): {reason}")]
    PassphraseMismatch {
        /// File path or `<inline>` for in-memory keys.
        origin: String,
        /// What was wrong.
        reason: String,
    },

    /// The configured assertion lifetime exceeds what the service accepts.
    #[error("identity assertion lifetime of {requested_secs}s exceeds the maximum of {max_secs}s")]
    ExpiryTooLong {
        /// Requested lifetime in seconds.
        requested_secs: u64,
        /// Maximum lifetime in seconds.
        max_secs: u64,
    },

    /// The configured assertion lifetime is unusable for another reason.
    #[error("invalid identity assertion lifetime: {0}")]
    InvalidLifetime(String),

    /// JWT encoding or signing failed.
    #[error("failed to sign identity assertion: {0}")]
    Signing(String),

    /// Key-pair generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Key generation would overwrite an existing file.
    #[error("refusing to overwrite existing key file: {}", .path.display())]
    KeyExists {
        /// The file that already exists.
        path: PathBuf,
    },

    /// I/O error reading or writing key files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<jsonwebtoken::errors::Error> for CredentialError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        Self::Signing(e.to_string())
    }
}
