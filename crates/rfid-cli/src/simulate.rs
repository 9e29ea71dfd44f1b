//! # Simulate Subcommand
//!
//! Streams synthetic badge events into the configured pipe.
//!
//! ## Flow
//!
//! 1. Build the ingestion driver. A bad rate or batch size fails here,
//!    before any key is read or request made.
//! 2. Load the private key and create the shared [`StreamingClient`].
//! 3. Spawn one worker per channel. Each opens its own session, runs the
//!    driver with its own generator, checks the final channel status, then
//!    closes (or drops) the channel.
//! 4. Ctrl-C, or the first failing worker, cancels every worker at its next
//!    batch boundary.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use rfid_auth::{IssuerConfig, KeyMaterial, TokenIssuer};
use rfid_core::BadgeEventGenerator;
use rfid_streaming::{
    ChannelSession, ChannelStatus, IngestionDriver, RunSummary, StreamingClient, StreamingError,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{SimulatorConfig, ValidatedConfig};

/// Arguments for the `simulate` subcommand. Flags override the config file
/// and environment.
#[derive(Args, Debug, Clone, Default)]
pub struct SimulateArgs {
    /// YAML configuration file. `KEY=value` env files are not accepted here;
    /// export their entries as environment variables instead.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Days of event history to generate, ending now.
    #[arg(long)]
    pub duration_days: Option<u32>,

    /// Target events per second, per channel.
    #[arg(long)]
    pub events_per_second: Option<f64>,

    /// Events per append request.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Run until interrupted, stamping events with the current time.
    #[arg(long, conflicts_with_all = ["duration_days", "max_batches"])]
    pub continuous: bool,

    /// Stop each channel after this many batches.
    #[arg(long)]
    pub max_batches: Option<u64>,

    /// Number of channels to stream on in parallel.
    #[arg(long)]
    pub channels: Option<usize>,

    /// Reject events that only raise warnings. `--strict=false` turns off
    /// strict mode set in the config file or environment.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
    pub strict: Option<bool>,

    /// Delete the channels on the server when the run ends.
    /// `--drop-channel-on-exit=false` overrides a configured `true`.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
    pub drop_channel_on_exit: Option<bool>,
}

impl SimulateArgs {
    /// Overlay the flags that were given onto `config`.
    pub fn apply_to(&self, config: &mut SimulatorConfig) {
        if let Some(days) = self.duration_days {
            config.duration_days = days;
        }
        if let Some(rate) = self.events_per_second {
            config.events_per_second = rate;
        }
        if let Some(size) = self.batch_size {
            config.batch_size = size;
        }
        if let Some(channels) = self.channels {
            config.num_channels = channels;
        }
        if let Some(n) = self.max_batches {
            config.max_batches = Some(n);
        }
        if let Some(strict) = self.strict {
            config.strict_validation = strict;
        }
        if let Some(drop) = self.drop_channel_on_exit {
            config.drop_channel_on_exit = drop;
        }
        config.continuous |= self.continuous;
    }
}

/// What one channel worker achieved.
#[derive(Debug)]
pub struct ChannelReport {
    pub channel: String,
    pub summary: RunSummary,
    /// Status reported by the service after the run, when it could be read.
    pub final_status: Option<ChannelStatus>,
    /// The error that stopped the worker.
    pub failure: Option<StreamingError>,
}

/// Per-channel reports for a whole run.
#[derive(Debug, Default)]
pub struct SimulationReport {
    pub channels: Vec<ChannelReport>,
}

impl SimulationReport {
    pub fn events_sent(&self) -> u64 {
        self.channels.iter().map(|c| c.summary.events_sent).sum()
    }

    pub fn events_rejected(&self) -> u64 {
        self.channels.iter().map(|c| c.summary.events_rejected).sum()
    }

    pub fn batches_sent(&self) -> u64 {
        self.channels.iter().map(|c| c.summary.batches_sent).sum()
    }

    pub fn is_success(&self) -> bool {
        self.channels.iter().all(|c| c.failure.is_none())
    }

    pub fn was_cancelled(&self) -> bool {
        self.channels.iter().any(|c| c.summary.cancelled)
    }
}

/// Entry point for `rfid-sim simulate`. Returns the process exit code.
pub async fn run_simulate(args: &SimulateArgs) -> anyhow::Result<u8> {
    let mut config = SimulatorConfig::load(args.config.as_deref())?;
    args.apply_to(&mut config);
    let validated = config.validate()?;
    tracing::info!(config = ?validated, "configuration loaded");

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received; stopping after the current batch");
                cancel.cancel();
            }
        }
    });

    let report = simulate(&validated, cancel).await?;
    log_report(&report);
    Ok(if report.is_success() { 0 } else { 1 })
}

/// Run a simulation from validated settings until every channel finishes.
///
/// Errors before any channel starts (bad rate, unreadable key) are
/// returned directly. Failures inside a channel are recorded in its
/// [`ChannelReport`].
pub async fn simulate(
    config: &ValidatedConfig,
    cancel: CancellationToken,
) -> anyhow::Result<SimulationReport> {
    let driver = IngestionDriver::new(config.driver.clone())?;
    let client = Arc::new(connect(config)?);
    simulate_with_client(config, driver, client, cancel).await
}

fn connect(config: &ValidatedConfig) -> anyhow::Result<StreamingClient> {
    let key = KeyMaterial::load(&config.private_key_path, config.passphrase())?;
    tracing::info!(
        fingerprint = %key.fingerprint(),
        bits = key.bits(),
        "loaded private key"
    );
    let issuer = TokenIssuer::with_config(
        Arc::new(key),
        &config.streaming.account,
        &config.streaming.user,
        IssuerConfig::default(),
    )?;
    Ok(StreamingClient::new(config.streaming.clone(), Arc::new(issuer))?)
}

/// Run one worker per channel name on a shared client.
pub async fn simulate_with_client(
    config: &ValidatedConfig,
    driver: IngestionDriver,
    client: Arc<StreamingClient>,
    cancel: CancellationToken,
) -> anyhow::Result<SimulationReport> {
    let mut workers = JoinSet::new();
    for channel in config.channel_names() {
        let session = client.channel(&channel)?;
        let source = BadgeEventGenerator::new(config.generator)?;
        let driver = driver.clone();
        let cancel = cancel.clone();
        let drop_on_exit = config.drop_channel_on_exit;
        workers.spawn(async move {
            run_channel(session, source, driver, cancel, drop_on_exit).await
        });
    }

    let mut report = SimulationReport::default();
    while let Some(joined) = workers.join_next().await {
        report.channels.push(joined?);
    }
    report.channels.sort_by(|a, b| a.channel.cmp(&b.channel));
    Ok(report)
}

async fn run_channel(
    mut session: ChannelSession,
    mut source: BadgeEventGenerator,
    driver: IngestionDriver,
    cancel: CancellationToken,
    drop_on_exit: bool,
) -> ChannelReport {
    let channel = session.channel_name().to_string();
    let mut report = ChannelReport {
        channel: channel.clone(),
        summary: RunSummary::default(),
        final_status: None,
        failure: None,
    };

    if let Err(error) = session.open().await {
        tracing::error!(channel = %channel, "failed to open channel: {error}");
        report.failure = Some(error);
        cancel.cancel();
        return report;
    }

    let validator = driver.default_validator();
    match driver.run(&mut source, &validator, &mut session, &cancel).await {
        Ok(summary) => report.summary = summary,
        Err(err) => {
            report.summary = err.summary;
            report.failure = Some(err.error);
            cancel.cancel();
        }
    }

    match session.status().await {
        Ok(status) => {
            tracing::info!(channel = %channel, status = ?status, "final channel status");
            report.final_status = Some(status);
        }
        Err(error) => tracing::warn!(channel = %channel, "could not read channel status: {error}"),
    }

    let finished = if drop_on_exit {
        session.drop_channel().await
    } else {
        session.close()
    };
    if let Err(error) = finished {
        tracing::warn!(channel = %channel, "channel shutdown failed: {error}");
    }
    report
}

fn log_report(report: &SimulationReport) {
    for channel in &report.channels {
        tracing::info!(
            channel = %channel.channel,
            events_sent = channel.summary.events_sent,
            events_rejected = channel.summary.events_rejected,
            batches = channel.summary.batches_sent,
            elapsed_secs = channel.summary.elapsed.as_secs_f64(),
            average_rate = channel.summary.average_rate(),
            "channel summary"
        );
        if let Some(error) = &channel.failure {
            tracing::error!(channel = %channel.channel, "channel stopped: {error}");
        }
    }
    tracing::info!(
        events_sent = report.events_sent(),
        events_rejected = report.events_rejected(),
        batches = report.batches_sent(),
        channels = report.channels.len(),
        cancelled = report.was_cancelled(),
        "simulation finished"
    );
}
