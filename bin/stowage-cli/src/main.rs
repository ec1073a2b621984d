//! Stowage CLI - Capacity-aware storage from the command line
//!
//! This binary exposes the entry manager of one storage area, plus a
//! scripted smoke test of the whole stack.

use anyhow::{Result, bail, ensure};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use stowage_common::{Error, StorageArea, StowageConfig, Units};
use stowage_manager::{
    CapacityProber, ManagerOptions, ManualClock, StorageRegistry, SystemClock, WebStorageManager,
};
use stowage_store::MemoryStorage;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "stowage-cli")]
#[command(about = "Capacity-aware key/value storage")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "./stowage.toml")]
    config: String,

    /// Storage area (localStorage, sessionStorage, windowStorage)
    #[arg(short, long)]
    area: Option<StorageArea>,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the capacity of the selected area
    Probe,
    /// Show the capacity of the persistent and session areas
    Navigator,
    /// Store a value (parsed as JSON, or taken as a string)
    Set {
        key: String,
        /// Value to store; omitting it is rejected
        value: Option<String>,
        /// Expire the entry after this many milliseconds
        #[arg(long)]
        ttl_ms: Option<u64>,
    },
    /// Print the value stored under a key
    Get { key: String },
    /// Delete a key
    Remove { key: String },
    /// Check whether a key is stored
    Has { key: String },
    /// List stored keys
    Keys,
    /// Delete every entry
    Clear,
    /// Show used and available space, or the size of one entry
    Space { key: Option<String> },
    /// Run a scripted end-to-end scenario against a scratch session area
    Smoke,
}

fn load_config(path: &str) -> Result<StowageConfig> {
    if !std::path::Path::new(path).exists() {
        return Ok(StowageConfig::default());
    }
    let config_str = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to parse config file: {e}");
        StowageConfig::default()
    }))
}

fn parse_value(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    // CLI takes precedence over the config file
    let log_level = args
        .log_level
        .unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let area = args.area.unwrap_or(config.storage.default_area);
    let options = ManagerOptions {
        probe: config.probe,
        clock: Arc::new(SystemClock),
    };

    if let Commands::Smoke = args.command {
        return smoke(&config);
    }

    let registry = StorageRegistry::from_config(&config.storage);
    if let Commands::Navigator = args.command {
        let prober = CapacityProber::new(options.probe, options.clock);
        let space = prober.navigator_space(&registry)?;
        println!("{}: {}", StorageArea::Persistent, space.persistent);
        println!("{}: {}", StorageArea::Session, space.session);
        return Ok(());
    }

    let mut manager = WebStorageManager::get_instance_with(&registry, area, options);
    match args.command {
        Commands::Probe => {
            println!("{}: {}", manager.area(), manager.total_units()?);
        }
        Commands::Set { key, value, ttl_ms } => {
            let ttl = ttl_ms.map(Duration::from_millis);
            manager.set_value(&key, value.map(parse_value), ttl)?;
        }
        Commands::Get { key } => match manager.get_value(&key) {
            Ok(Some(value)) => println!("{}", serde_json::to_string_pretty(&value)?),
            Ok(None) => bail!("{key} is not stored in {}", manager.area()),
            Err(e) if e.is_not_found() => bail!("{key} is not stored in {}: {e}", manager.area()),
            Err(e) => return Err(e.into()),
        },
        Commands::Remove { key } => match manager.remove_item(&key) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => warn!("Nothing to remove: {}", e),
            Err(e) => return Err(e.into()),
        },
        Commands::Has { key } => println!("{}", manager.has_item(&key)?),
        Commands::Keys => {
            for key in manager.keys()? {
                println!("{key}");
            }
        }
        Commands::Clear => manager.clear()?,
        Commands::Space { key: Some(key) } => match manager.used_space_for(&key)? {
            Some(size) => println!("{key}: {size}"),
            None => bail!("{key} is not stored in {}", manager.area()),
        },
        Commands::Space { key: None } => {
            println!("Area:      {}", manager.area());
            println!("Total:     {}", manager.total_units()?);
            println!("Used:      {}", manager.used_units()?);
            println!("Available: {}", manager.available_units()?);
        }
        Commands::Navigator | Commands::Smoke => unreachable!("handled above"),
    }
    Ok(())
}

/// Exercise probing, accounting, expiry and fallback on scratch areas
fn smoke(config: &StowageConfig) -> Result<()> {
    let clock = ManualClock::new(1_700_000_000_000);
    let options = ManagerOptions {
        probe: config.probe,
        clock: Arc::new(clock.clone()),
    };
    let registry = StorageRegistry::new().with_area(Arc::new(MemoryStorage::session(
        config.storage.session_quota,
    )));

    let mut manager =
        WebStorageManager::open_with(&registry, StorageArea::Session, options.clone())?;
    let total = manager.total_units()?;
    info!("Scratch session area holds {} units", total);
    println!("probe: {total}");

    manager.set_item("greeting", "hello")?;
    manager.set_item_with_ttl("session", &[1, 2, 3], Duration::from_millis(5_000))?;
    check_balance(&mut manager, total)?;

    clock.advance(Duration::from_millis(4_000));
    ensure!(
        manager.get_item::<Vec<i32>>("session")? == Some(vec![1, 2, 3]),
        "entry expired early"
    );
    clock.advance(Duration::from_millis(2_000));
    match manager.get_item::<Vec<i32>>("session") {
        Err(Error::ExpiredKey(_)) => println!("expiry: ok"),
        other => bail!("expected the entry to expire, got {other:?}"),
    }
    ensure!(!manager.has_item("session")?, "expired entry was kept");

    let huge = "0".repeat(10_000_000);
    match manager.set_item("huge", &huge) {
        Err(Error::InsufficientSpace { .. }) => println!("quota: ok"),
        other => bail!("expected an oversized write to be rejected, got {other:?}"),
    }

    let before = manager.available_units()?;
    let size = manager.used_space_for("greeting")?.unwrap_or(Units::ZERO);
    manager.remove_item("greeting")?;
    ensure!(
        manager.available_units()? == before.saturating_add(size),
        "remove did not free {size}"
    );
    manager.clear()?;
    check_balance(&mut manager, total)?;
    println!("accounting: ok");

    let fallback =
        WebStorageManager::get_instance_with(&StorageRegistry::new(), StorageArea::Persistent, options);
    if fallback.area() != StorageArea::Memory {
        warn!("Fallback bound to {} instead of the memory area", fallback.area());
        bail!("fallback did not use the memory area");
    }
    println!("fallback: ok");
    Ok(())
}

fn check_balance(manager: &mut WebStorageManager, total: Units) -> Result<()> {
    let used = manager.used_units()?;
    let available = manager.available_units()?;
    ensure!(
        used.saturating_add(available) == total,
        "used {used} + available {available} != total {total}"
    );
    Ok(())
}
