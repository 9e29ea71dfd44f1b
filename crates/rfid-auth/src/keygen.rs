//! # Key-Pair Generation
//!
//! Produces a fresh RSA key pair in the layout the loader expects:
//! `private_key.pem` (unencrypted PKCS#8) and `public_key.pem` (SPKI).
//! The public key is also returned as a single base64 line, the form the
//! service's `ALTER USER ... SET RSA_PUBLIC_KEY='...'` statement takes.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use rand_core::OsRng;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;

use crate::error::CredentialError;
use crate::key::{KeyMaterial, MIN_KEY_BITS};

pub const PRIVATE_KEY_FILE: &str = "private_key.pem";
pub const PUBLIC_KEY_FILE: &str = "public_key.pem";

/// Paths and identity of a freshly written key pair.
#[derive(Debug, Clone)]
pub struct GeneratedKeyPair {
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    /// Base64 body of `public_key.pem` with header, footer and newlines
    /// removed.
    pub public_key_single_line: String,
    pub fingerprint: String,
}

/// Generate a `bits`-bit key pair into `dir`.
///
/// The directory is created if missing. Existing key files are only
/// replaced when `overwrite` is set.
pub fn generate_keypair(
    dir: impl AsRef<Path>,
    bits: usize,
    overwrite: bool,
) -> Result<GeneratedKeyPair, CredentialError> {
    if bits < MIN_KEY_BITS {
        return Err(CredentialError::KeyGeneration(format!(
            "key size {bits} is below the minimum of {MIN_KEY_BITS} bits"
        )));
    }

    let dir = dir.as_ref();
    let private_key_path = dir.join(PRIVATE_KEY_FILE);
    let public_key_path = dir.join(PUBLIC_KEY_FILE);
    if !overwrite {
        for path in [&private_key_path, &public_key_path] {
            if path.exists() {
                return Err(CredentialError::KeyExists { path: path.clone() });
            }
        }
    }
    fs::create_dir_all(dir)?;

    let private = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| CredentialError::KeyGeneration(e.to_string()))?;
    let private_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CredentialError::KeyGeneration(e.to_string()))?;

    let material = KeyMaterial::from_private_key(private)?;
    let public_pem = material.public_key_pem()?;

    write_private(&private_key_path, private_pem.as_bytes())?;
    fs::write(&public_key_path, public_pem.as_bytes())?;

    tracing::info!(
        private_key = %private_key_path.display(),
        public_key = %public_key_path.display(),
        fingerprint = %material.fingerprint(),
        "generated RSA key pair"
    );

    Ok(GeneratedKeyPair {
        private_key_path,
        public_key_path,
        public_key_single_line: pem_body(&public_pem),
        fingerprint: material.fingerprint().to_string(),
    })
}

/// Strip PEM armour and join the base64 lines.
pub fn pem_body(pem: &str) -> String {
    pem.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("-----"))
        .collect()
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> Result<(), CredentialError> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> Result<(), CredentialError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pem_body_joins_lines() {
        let pem = "-----BEGIN PUBLIC KEY-----\nAAAA\nBBBB\n-----END PUBLIC KEY-----\n";
        assert_eq!(pem_body(pem), "AAAABBBB");
    }

    #[test]
    fn small_keys_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let err = generate_keypair(dir.path(), 1024, false).unwrap_err();
        assert!(matches!(err, CredentialError::KeyGeneration(_)));
    }

    #[test]
    fn existing_files_are_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PRIVATE_KEY_FILE), "keep me").unwrap();
        let err = generate_keypair(dir.path(), 2048, false).unwrap_err();
        assert!(matches!(err, CredentialError::KeyExists { .. }));
        assert_eq!(
            fs::read_to_string(dir.path().join(PRIVATE_KEY_FILE)).unwrap(),
            "keep me"
        );
    }
}
