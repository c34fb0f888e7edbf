//! mockcore - CLI Entry Point
//!
//! Loads and checks engine configuration. Transports embed the library.

use anyhow::Result;
use clap::Parser;
use mockcore::config::DEFAULT_CONFIG;
use mockcore::{EngineConfig, MockServer};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "mockcore",
    about = "Programmable mock server core - configuration checks and inspection",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mockcore.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        print!("{}", DEFAULT_CONFIG);
        return Ok(());
    }

    // Load configuration
    let config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        EngineConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration");
        EngineConfig::default()
    };

    if args.validate {
        config.validate()?;
        println!(
            "Configuration is valid (not_matched_status {}, channel_capacity {})",
            config.settings.not_matched_status, config.pipeline.channel_capacity
        );
        return Ok(());
    }

    // Build an engine to surface the effective settings
    let server: MockServer<serde_json::Value> = MockServer::new(config);
    print!("{}", server.config().to_yaml()?);
    info!(stats = ?server.stats(), "Engine ready");

    Ok(())
}
