//! Hive Controller - Main entry point
//!
//! Reconciles the devices attached to this hive with Hive Mind and keeps the
//! resulting device handles up to date.

mod config;
mod controller;

use anyhow::{Context, Result};
use clap::Parser;
use hive_core::{HandleFactory, Reconciler, RegistryClient};
use hive_mind::{HiveIdentity, HiveMindClient, OfflineRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::HiveMindConfig;
use crate::controller::Controller;

#[derive(Parser, Debug)]
#[command(name = "hive-controller")]
#[command(about = "Test device controller reconciling attached devices with Hive Mind")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "hive.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Run a single reconciliation pass and exit
    #[arg(long)]
    once: bool,

    /// List attached devices that are not trusted and exit
    #[arg(long)]
    untrusted: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Hive controller v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    let platform = config.controller.platform;
    info!(
        platform = %platform,
        hive_mind = %config.hive_mind.url,
        "Configuration loaded"
    );

    let source = hive_discovery::source_for(platform);

    if args.untrusted {
        let untrusted = source.untrusted().await?;
        if untrusted.is_empty() {
            println!("No untrusted devices");
        } else {
            println!("Untrusted devices:");
            for device in untrusted {
                println!("  - {}", device.serial);
            }
        }
        return Ok(());
    }

    let registry = connect_registry(&config.hive_mind).await?;
    let reconciler = Reconciler::new(
        registry,
        source,
        HandleFactory::new(platform),
        config.controller.options.clone(),
    );
    let mut controller = Controller::new(reconciler);

    if args.once {
        let outcome = controller.pass().await?;
        println!("Reconciled {} devices:", outcome.handles.len());
        for handle in &outcome.handles {
            println!(
                "  - {} ({}) id {} {} {}",
                handle.display_name(),
                handle.serial,
                handle.id,
                handle.model,
                handle.os_version
            );
            println!("    Queues: {}", handle.queues.join(", "));
        }
        if outcome.report.fallback {
            println!("Hive Mind unavailable, devices enumerated locally");
        }
        return Ok(());
    }

    controller
        .run(Duration::from_secs(config.controller.poll_interval_secs))
        .await
}

/// Build the registry client, registering this hive when it has no id
async fn connect_registry(config: &HiveMindConfig) -> Result<Arc<dyn RegistryClient>> {
    if !config.enabled {
        info!("Hive Mind disabled, devices will be enumerated locally");
        return Ok(Arc::new(OfflineRegistry::new("Hive Mind disabled in configuration")));
    }

    let mut client = HiveMindClient::new(&config.url, Duration::from_secs(config.timeout_secs))?;

    match &config.hive_id {
        Some(hive_id) => client = client.with_hive_id(hive_id.clone()),
        None => {
            let identity = HiveIdentity::detect();
            if let Err(e) = client.register_hive(&identity).await {
                // Without an id every snapshot is unavailable and passes run locally
                warn!(error = %e, "Failed to register hive with Hive Mind");
            }
        }
    }

    Ok(Arc::new(client))
}
