//! Standalone validator for economy configuration files.
//!
//! Checks bonus ranges, stake tiers and the shop catalog before the file
//! is handed to the service.

use std::process::ExitCode;

use clap::Parser;

use bot_economy::config::{EconomyConfig, ItemEffect};

/// Economy configuration validator.
#[derive(Parser, Debug)]
#[command(name = "validate_economy")]
#[command(about = "Validates economy configuration files for the chat bot")]
#[command(version)]
struct Args {
    /// Path to the JSON configuration file to validate.
    #[arg(short, long, default_value = "economy.json")]
    file: String,

    /// Generate an example configuration file at the specified path.
    #[arg(long)]
    generate_example: Option<String>,

    /// Show every shop item and stake tier.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(output_path) = args.generate_example {
        return generate_example(&output_path);
    }

    validate_config(&args.file, args.verbose)
}

fn generate_example(output_path: &str) -> ExitCode {
    let example = EconomyConfig::example();

    match example.save_to_file(output_path) {
        Ok(()) => {
            println!("✓ Example configuration written to: {output_path}");
            println!("\nThe file contains {} shop items.", example.shop.len());
            println!("Replace the admin ID with your own before deploying.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Failed to write example file: {e}");
            ExitCode::FAILURE
        }
    }
}

fn validate_config(path: &str, verbose: bool) -> ExitCode {
    println!("Validating: {path}\n");

    let config = match EconomyConfig::load_from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("✗ Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if verbose {
        println!(
            "Starting balance: {}, daily bonus: {}..={}",
            config.starting_balance, config.daily_bonus.min, config.daily_bonus.max
        );
        println!(
            "Referral bonus: {} inviter / {} invited",
            config.referral.inviter, config.referral.invited
        );
        println!("Stake tiers: {:?}", config.stake_tiers);
        for item in &config.shop {
            println!("[{}] {} ({} coins): {}", item.id, item.name, item.price, describe(&item.effect));
        }
        println!();
    }

    let errors = config.validate_all();
    if errors.is_empty() {
        println!(
            "✓ Configuration is valid ({} shop items, {} stake tiers, {} admins)",
            config.shop.len(),
            config.stake_tiers.len(),
            config.admins.len()
        );
        if config.admins.is_empty() {
            println!("  (no admins listed; set ADMIN_IDS at runtime)");
        }
        ExitCode::SUCCESS
    } else {
        for e in &errors {
            println!("  ✗ Error: {e}");
        }
        println!("\n✗ Validation failed: {} error(s)", errors.len());
        ExitCode::FAILURE
    }
}

fn describe(effect: &ItemEffect) -> String {
    match effect {
        ItemEffect::Status { status, days } => format!("{status} for {days} days"),
        ItemEffect::Lootbox { min, max } => format!("lootbox {min}..={max}"),
        ItemEffect::Cosmetic { status } => format!("permanent {status}"),
    }
}
