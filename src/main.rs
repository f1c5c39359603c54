//! Bot Economy - Main Entry Point
//!
//! Hosts the economy ledger for a chat bot front-end: restores the ledger
//! snapshot, keeps it flushed to disk and serves a liveness probe.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use bot_economy::Economy;
use bot_economy::clock::SystemClock;
use bot_economy::config::{BotSettings, EconomyConfig};
use bot_economy::engine::{SeededRandom, SharedRandom};
use bot_economy::health;
use bot_economy::ledger::{LedgerSnapshot, LedgerStore};
use bot_economy::persistence::{FlusherMessage, SnapshotFlusher};

/// Virtual economy service for a chat bot.
#[derive(Parser, Debug)]
#[command(name = "bot_economy")]
#[command(about = "Run the chat bot economy ledger")]
#[command(version)]
struct Args {
    /// Path to the economy JSON configuration file (overrides ECONOMY_CONFIG).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Seed the random source for reproducible outcomes.
    #[arg(long)]
    seed: Option<u64>,

    /// Generate an example configuration file and exit.
    #[arg(long)]
    generate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    if args.generate_config {
        return generate_example_config();
    }

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let mut settings = BotSettings::from_env_with_defaults();
    if let Some(path) = args.config {
        settings.economy_path = path;
    }

    let config = load_economy_config(&settings)?;
    info!(
        "Loaded economy (start balance {}, daily {}..={}, {} shop items, {} admins)",
        config.starting_balance,
        config.daily_bonus.min,
        config.daily_bonus.max,
        config.shop.len(),
        config.admins.len()
    );

    let snapshot = LedgerSnapshot::load(&settings.snapshot_path).with_context(|| {
        format!("Failed to load ledger snapshot from {}", settings.snapshot_path.display())
    })?;
    info!(
        "Restored {} accounts and {} transactions from {}",
        snapshot.accounts.len(),
        snapshot.transaction_count(),
        settings.snapshot_path.display()
    );

    let store = Arc::new(LedgerStore::from_snapshot(
        snapshot,
        Arc::new(SystemClock),
        settings.storage_timeout(),
    ));
    let random = match args.seed {
        Some(seed) => {
            warn!("Random source seeded with {}; outcomes are reproducible", seed);
            SharedRandom::new(SeededRandom::seeded(seed))
        }
        None => SharedRandom::new(SeededRandom::from_entropy()),
    };
    let economy = Economy::new(
        Arc::clone(&store),
        Arc::new(config),
        random,
        settings.broadcast_interval(),
    );

    // Flusher
    let (flusher_tx, flusher_rx) = mpsc::channel::<FlusherMessage>(8);
    let flusher = SnapshotFlusher::new(Arc::clone(&store), settings.snapshot_path.clone())
        .with_interval(settings.snapshot_interval());
    let flusher_handle = tokio::spawn(async move {
        flusher.run(flusher_rx).await;
    });

    // Liveness probe
    let (health_tx, health_rx) = oneshot::channel::<()>();
    let health_addr = settings.health_addr;
    let health_handle = tokio::spawn(async move {
        let shutdown = async move {
            let _ = health_rx.await;
        };
        if let Err(e) = health::serve(health_addr, shutdown).await {
            warn!("Health probe stopped: {:#}", e);
        }
    });

    info!(
        "Economy is running with {} accounts. Use Ctrl+C to stop.",
        economy.store().account_count().await?
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down...");

    let _ = health_tx.send(());
    let _ = flusher_tx.send(FlusherMessage::Shutdown).await;
    let _ = flusher_handle.await;
    let _ = health_handle.await;
    info!("Ledger saved to {}", settings.snapshot_path.display());

    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Loads the economy file, falling back to built-in defaults when it is
/// missing, then merges `ADMIN_IDS` and validates.
fn load_economy_config(settings: &BotSettings) -> Result<EconomyConfig> {
    let config = if settings.economy_path.exists() {
        EconomyConfig::load_from_file(&settings.economy_path).with_context(|| {
            format!("Failed to load economy configuration from {}", settings.economy_path.display())
        })?
    } else {
        warn!(
            "{} not found, using built-in economy defaults",
            settings.economy_path.display()
        );
        EconomyConfig::default()
    };

    let admins = BotSettings::admin_ids_from_env().context("Failed to parse ADMIN_IDS")?;
    let config = config.with_admins(admins);
    if config.admins.is_empty() {
        warn!("No admins configured; admin operations will be rejected");
    }

    config
        .validate()
        .context("Economy configuration validation failed")?;
    Ok(config)
}

/// Generates an example configuration file.
fn generate_example_config() -> Result<()> {
    let example = EconomyConfig::example();
    example.save_to_file("economy.example.json")?;

    println!("✓ Example configuration written to: economy.example.json");
    println!("\nTo use this service:");
    println!("1. Copy economy.example.json to economy.json");
    println!("2. Tune the bonuses, stakes and shop to your liking");
    println!("3. Create a .env file with ADMIN_IDS and LEDGER_SNAPSHOT_PATH");
    println!("4. Run: bot_economy");

    Ok(())
}
