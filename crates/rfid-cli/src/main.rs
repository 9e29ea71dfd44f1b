//! # rfid-sim entry point
//!
//! Parses command-line arguments, installs the tracing subscriber and
//! dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use rfid_cli::keys::{run_fingerprint, run_keygen, FingerprintArgs, KeygenArgs};
use rfid_cli::simulate::{run_simulate, SimulateArgs};

/// RFID badge event simulator for streaming ingestion.
///
/// Generates synthetic badge scans and appends them to a pipe over the
/// streaming REST API, authenticating with an RSA key pair.
#[derive(Parser, Debug)]
#[command(name = "rfid-sim", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream synthetic badge events into the configured pipe.
    Simulate(SimulateArgs),

    /// Generate an RSA key pair for key-pair authentication.
    Keygen(KeygenArgs),

    /// Print the SHA256 fingerprint of a private key's public half.
    Fingerprint(FingerprintArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    tracing::debug!("rfid-sim v{} starting", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Commands::Simulate(args) => run_simulate(&args).await,
        Commands::Keygen(args) => run_keygen(&args),
        Commands::Fingerprint(args) => run_fingerprint(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

/// `RUST_LOG` wins when set; otherwise the verbosity flag picks the level.
fn init_tracing(verbose: u8, format: LogFormat) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
