//! # rfid-cli — The `rfid-sim` Command-Line Tool
//!
//! ## Subcommands
//!
//! - `rfid-sim simulate` — Stream synthetic badge events into the pipe.
//! - `rfid-sim keygen` — Write a new RSA key pair for the streaming user.
//! - `rfid-sim fingerprint` — Print the public-key fingerprint of a key.
//!
//! ```bash
//! rfid-sim keygen --output-dir config/keys --user RFID_USER
//! rfid-sim simulate --config config/simulator.yaml --duration-days 1
//! rfid-sim -v simulate --continuous --channels 4 --events-per-second 500
//! ```
//!
//! ## Crate Policy
//!
//! - Argument parsing and configuration loading live here; streaming and
//!   credential logic stay in `rfid-streaming` and `rfid-auth`.
//! - The tracing subscriber is installed only by the binary.

pub mod config;
pub mod keys;
pub mod simulate;
