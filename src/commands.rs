use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use colored::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::Commands;
use crate::config::{Certificate, KeeperConfig};
use crate::network::{new_node_network, MergeReport, NodeKeeper, PulseNumber, RoundDriver};
use crate::security::{CryptographyService, Ed25519CryptographyService};

/// Execute a CLI command
pub fn execute_command(command: Commands, verbose: bool) -> anyhow::Result<()> {
    match command {
        Commands::Keygen { output } => execute_keygen(&output, verbose),
        Commands::OriginClaim { config, certificate, key } => {
            execute_origin_claim(config, &certificate, &key, verbose)
        }
        Commands::Run { config, certificate, key, pulses } => {
            execute_run(config, &certificate, key, pulses, verbose)
        }
    }
}

/// Install the global `tracing` subscriber
pub fn init_logging(level: &str, verbose: bool) {
    let level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // A subscriber may already be installed when commands run in-process.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<KeeperConfig> {
    match path {
        Some(path) => KeeperConfig::from_file(&path)
            .with_context(|| format!("loading configuration {}", path.display())),
        None => Ok(KeeperConfig::default()),
    }
}

fn build_keeper(
    config: &KeeperConfig,
    certificate: &Path,
    key: Option<&Path>,
) -> anyhow::Result<NodeKeeper> {
    let certificate = Certificate::from_file(certificate)
        .with_context(|| format!("loading certificate {}", certificate.display()))?;
    let crypto = match key {
        Some(path) => Ed25519CryptographyService::from_file(path)
            .with_context(|| format!("loading key {}", path.display()))?,
        None => Ed25519CryptographyService::generate()?,
    };
    Ok(new_node_network(config, &certificate, Arc::new(crypto))?)
}

fn execute_keygen(output: &Path, verbose: bool) -> anyhow::Result<()> {
    init_logging("info", verbose);
    let crypto = Ed25519CryptographyService::generate()?;
    std::fs::write(output, crypto.pkcs8())
        .with_context(|| format!("writing key {}", output.display()))?;

    let public_key = crypto.get_public_key()?;
    println!("{} {}", "Key written to".bright_green(), output.display());
    println!("{} {}", "Public key:".bright_cyan(), hex::encode(public_key.as_bytes()));
    Ok(())
}

fn execute_origin_claim(
    config: Option<PathBuf>,
    certificate: &Path,
    key: &Path,
    verbose: bool,
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    init_logging(&config.log.level, verbose);

    let keeper = build_keeper(&config, certificate, Some(key))?;
    let claim = keeper.get_origin_claim()?;
    println!("{}", serde_json::to_string_pretty(&claim)?);
    Ok(())
}

fn execute_run(
    config: Option<PathBuf>,
    certificate: &Path,
    key: Option<PathBuf>,
    pulses: u32,
    verbose: bool,
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    init_logging(&config.log.level, verbose);

    let keeper = build_keeper(&config, certificate, key.as_deref())?
        .with_graceful_stop(|| info!("graceful stop requested"));
    let keeper = Arc::new(keeper);

    let origin = keeper.get_origin();
    if keeper.get_active_node(&origin.id()).is_none() {
        info!(node = %origin.id(), "origin not active yet, queueing its join claim");
        keeper.add_pending_claim(keeper.get_origin_claim()?.into());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let mut driver = RoundDriver::new(Arc::clone(&keeper));
        let mut ticker = tokio::time::interval(Duration::from_millis(config.round.pulse_interval_ms));

        for pulse in pulse_schedule(config.round.first_pulse(), pulses) {
            ticker.tick().await;
            let report = driver.on_pulse(pulse)?;
            print_round(&keeper, &report);
            if report.left_cluster {
                println!("{} at pulse {}", "Node left the cluster".bright_yellow(), report.pulse);
                break;
            }
        }
        Ok::<_, anyhow::Error>(())
    })?;

    println!("{} {}", "Cloud hash:".bright_cyan(), hex::encode(keeper.get_cloud_hash()));
    println!("{}", serde_json::to_string_pretty(&keeper.get_stats())?);
    Ok(())
}

/// Up to `count` consecutive pulses starting at `first`, ending early at the counter limit
fn pulse_schedule(first: PulseNumber, count: u32) -> impl Iterator<Item = PulseNumber> {
    std::iter::successors(Some(first), |pulse| pulse.next()).take(count as usize)
}

fn print_round(keeper: &NodeKeeper, report: &MergeReport) {
    println!(
        "{} {} (admitted {}, removed {}, dropped {})",
        "Pulse".bright_yellow().bold(),
        report.pulse,
        report.admitted.len(),
        report.removed.len(),
        report.dropped.len()
    );
    for dropped in &report.dropped {
        println!("  {} {} {}", "dropped".bright_red(), dropped.claimant, dropped.reason);
    }
    for node in keeper.get_active_nodes() {
        println!(
            "  {} {:<15} short={:<10} {}",
            node.id(),
            node.role().to_string(),
            node.short_id(),
            node.address()
        );
    }
}
