//! RSA fixtures and assertion-decoding helpers for tests.
//!
//! Enabled for this crate's own tests and, through the `testutil` feature,
//! for downstream crates' dev-dependencies.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use crate::key::KeyMaterial;
use crate::token::Claims;

/// 2048-bit key A, PKCS#8 PEM.
pub const FIXTURE_A_PKCS8_PEM: &str = include_str!("../tests/fixtures/rsa_a_pkcs8.pem");
/// Key A, PKCS#1 PEM.
pub const FIXTURE_A_PKCS1_PEM: &str = include_str!("../tests/fixtures/rsa_a_pkcs1.pem");
/// Key A, PBES2-encrypted PKCS#8 PEM. Passphrase: [`FIXTURE_A_PASSPHRASE`].
pub const FIXTURE_A_ENCRYPTED_PEM: &str = include_str!("../tests/fixtures/rsa_a_encrypted.pem");
pub const FIXTURE_A_PASSPHRASE: &str = "correct-horse";
/// Key A, PKCS#8 DER.
pub const FIXTURE_A_PKCS8_DER: &[u8] = include_bytes!("../tests/fixtures/rsa_a_pkcs8.der");
/// Fingerprint of key A as computed by `openssl pkey -pubout -outform DER | openssl dgst -sha256 -binary | base64`.
pub const FIXTURE_A_FINGERPRINT: &str = "SHA256:prMm6/6oObsaqq/qBJ+N3BTczOMMB4PeVZ4vEMe3VXk=";

/// An unrelated 2048-bit key B, PKCS#8 PEM.
pub const FIXTURE_B_PKCS8_PEM: &str = include_str!("../tests/fixtures/rsa_b_pkcs8.pem");
pub const FIXTURE_B_FINGERPRINT: &str = "SHA256:IuxuJ8T7cl4mWRlqa3Mkd28iY74BttoN5VN8ceUbcnw=";

/// Key A, parsed once per process.
pub fn fixture_key() -> Arc<KeyMaterial> {
    static KEY: OnceLock<Arc<KeyMaterial>> = OnceLock::new();
    Arc::clone(KEY.get_or_init(|| {
        Arc::new(
            KeyMaterial::from_pem(FIXTURE_A_PKCS8_PEM, None)
                .expect("fixture key A must parse"),
        )
    }))
}

/// Verify `token` against key A and return its claims.
///
/// Expiry and audience are not checked so tests may use fixed clocks.
pub fn decode_claims(token: &str) -> Claims {
    let pem = fixture_key()
        .public_key_pem()
        .expect("fixture public key must encode");
    let key = DecodingKey::from_rsa_pem(pem.as_bytes()).expect("fixture public key must parse");
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    jsonwebtoken::decode::<Claims>(token, &key, &validation)
        .expect("assertion must verify against fixture key A")
        .claims
}
