//! Key loading from disk across every accepted encoding, plus key-pair
//! generation round trips.

use std::path::PathBuf;

use rfid_auth::{generate_keypair, pem_body, CredentialError, KeyMaterial};

const KEY_A_FINGERPRINT: &str = "SHA256:prMm6/6oObsaqq/qBJ+N3BTczOMMB4PeVZ4vEMe3VXk=";
const KEY_B_FINGERPRINT: &str = "SHA256:IuxuJ8T7cl4mWRlqa3Mkd28iY74BttoN5VN8ceUbcnw=";
const PASSPHRASE: &str = "correct-horse";

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[test]
fn every_encoding_of_key_a_has_the_same_fingerprint() {
    let keys = [
        KeyMaterial::load(fixture("rsa_a_pkcs8.pem"), None).unwrap(),
        KeyMaterial::load(fixture("rsa_a_pkcs1.pem"), None).unwrap(),
        KeyMaterial::load(fixture("rsa_a_pkcs8.der"), None).unwrap(),
        KeyMaterial::load(fixture("rsa_a_encrypted.pem"), Some(PASSPHRASE)).unwrap(),
    ];
    for key in &keys {
        assert_eq!(key.fingerprint(), KEY_A_FINGERPRINT);
        assert_eq!(key.bits(), 2048);
    }
}

#[test]
fn distinct_keys_have_distinct_fingerprints() {
    let a = KeyMaterial::load(fixture("rsa_a_pkcs8.pem"), None).unwrap();
    let b = KeyMaterial::load(fixture("rsa_b_pkcs8.pem"), None).unwrap();
    assert_eq!(b.fingerprint(), KEY_B_FINGERPRINT);
    assert_ne!(a.fingerprint(), b.fingerprint());
    assert_ne!(a.public_key_der(), b.public_key_der());
}

#[test]
fn hex_fingerprint_matches_openssl() {
    let b = KeyMaterial::load(fixture("rsa_b_pkcs8.pem"), None).unwrap();
    assert_eq!(
        b.fingerprint_hex(),
        "SHA256:22ec6e27c4fb725e2659196a6b7324776f2263be01b6da0de5537c71e51b727c"
    );
}

#[test]
fn encrypted_key_without_passphrase_is_mismatch() {
    let err = KeyMaterial::load(fixture("rsa_a_encrypted.pem"), None).unwrap_err();
    assert!(matches!(err, CredentialError::PassphraseMismatch { .. }));
}

#[test]
fn encrypted_key_with_wrong_passphrase_is_mismatch() {
    let err = KeyMaterial::load(fixture("rsa_a_encrypted.pem"), Some("battery-staple")).unwrap_err();
    assert!(matches!(err, CredentialError::PassphraseMismatch { .. }));
}

#[test]
fn plain_key_with_passphrase_is_mismatch() {
    for name in ["rsa_a_pkcs8.pem", "rsa_a_pkcs1.pem", "rsa_a_pkcs8.der"] {
        let err = KeyMaterial::load(fixture(name), Some(PASSPHRASE)).unwrap_err();
        assert!(
            matches!(err, CredentialError::PassphraseMismatch { .. }),
            "{name}: {err}"
        );
    }
}

#[test]
fn missing_file_is_not_found() {
    let err = KeyMaterial::load(fixture("does_not_exist.pem"), None).unwrap_err();
    match err {
        CredentialError::KeyNotFound { path } => {
            assert!(path.ends_with("does_not_exist.pem"));
        }
        other => panic!("expected KeyNotFound, got {other:?}"),
    }
}

#[test]
fn garbage_is_format_error() {
    let err = KeyMaterial::load(fixture("garbage.pem"), None).unwrap_err();
    match err {
        CredentialError::KeyFormat { origin, .. } => assert!(origin.ends_with("garbage.pem")),
        other => panic!("expected KeyFormat, got {other:?}"),
    }
}

#[test]
fn directory_is_not_a_key() {
    let dir = tempfile::tempdir().unwrap();
    let err = KeyMaterial::load(dir.path(), None).unwrap_err();
    assert!(matches!(err, CredentialError::KeyNotFound { .. }));
}

#[test]
fn generated_keypair_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let pair = generate_keypair(dir.path().join("keys"), 2048, false).unwrap();

    let loaded = KeyMaterial::load(&pair.private_key_path, None).unwrap();
    assert_eq!(loaded.fingerprint(), pair.fingerprint);

    let public_pem = std::fs::read_to_string(&pair.public_key_path).unwrap();
    assert!(public_pem.starts_with("-----BEGIN PUBLIC KEY-----"));
    assert_eq!(pem_body(&public_pem), pair.public_key_single_line);
    assert!(!pair.public_key_single_line.contains('\n'));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&pair.private_key_path)
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    // A second run refuses to clobber the pair unless asked.
    let err = generate_keypair(dir.path().join("keys"), 2048, false).unwrap_err();
    assert!(matches!(err, CredentialError::KeyExists { .. }));
}
