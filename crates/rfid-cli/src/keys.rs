//! # Key Subcommands
//!
//! `keygen` writes a new RSA key pair and prints the statement that
//! registers the public key on the streaming user. `fingerprint` prints the
//! `SHA256:` fingerprint of an existing private key, which must match the
//! `RSA_PUBLIC_KEY_FP` the service reports for the user.

use std::path::PathBuf;

use clap::Args;
use rfid_auth::{generate_keypair, GeneratedKeyPair, KeyMaterial, MIN_KEY_BITS};

/// Arguments for the `keygen` subcommand.
#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Directory to write `private_key.pem` and `public_key.pem` into.
    #[arg(long, default_value = "config/keys")]
    pub output_dir: PathBuf,

    /// RSA modulus size.
    #[arg(long, default_value_t = MIN_KEY_BITS)]
    pub bits: usize,

    /// Replace existing key files.
    #[arg(long)]
    pub force: bool,

    /// User to name in the printed registration statement.
    #[arg(long, env = "SNOWFLAKE_USER")]
    pub user: Option<String>,
}

/// Arguments for the `fingerprint` subcommand.
#[derive(Args, Debug)]
pub struct FingerprintArgs {
    /// Private key file (PEM or DER).
    #[arg(long, env = "SNOWFLAKE_PRIVATE_KEY_PATH")]
    pub key: PathBuf,

    /// Passphrase for an encrypted key.
    #[arg(long, env = "SNOWFLAKE_PRIVATE_KEY_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,
}

/// Entry point for `rfid-sim keygen`.
pub fn run_keygen(args: &KeygenArgs) -> anyhow::Result<u8> {
    let generated = generate_keypair(&args.output_dir, args.bits, args.force)?;
    println!("{}", keygen_report(&generated, args.user.as_deref()));
    Ok(0)
}

/// Entry point for `rfid-sim fingerprint`.
pub fn run_fingerprint(args: &FingerprintArgs) -> anyhow::Result<u8> {
    let key = KeyMaterial::load(&args.key, args.passphrase.as_deref())?;
    println!("{}", key.fingerprint());
    Ok(0)
}

/// Human-readable summary of a generated key pair.
pub fn keygen_report(generated: &GeneratedKeyPair, user: Option<&str>) -> String {
    let user = user.unwrap_or("<USER>");
    format!(
        "Private key: {}\n\
         Public key:  {}\n\
         Fingerprint: {}\n\
         \n\
         Register the public key with:\n\
         \n\
         ALTER USER {user} SET RSA_PUBLIC_KEY='{}';",
        generated.private_key_path.display(),
        generated.public_key_path.display(),
        generated.fingerprint,
        generated.public_key_single_line,
    )
}
