// Tunnelmon - Rathole tunnel health monitor and restart governor
// Main entry point

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tunnelmon::config::Config;
use tunnelmon::monitor::Monitor;
use tunnelmon::systemd::{JournalReader, SystemdDirectory};

#[derive(Parser, Debug)]
#[command(name = "tunnelmon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Run a single monitoring cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => PathBuf::from(path),
        None => Config::default_path()?,
    };
    let config = Config::load(Some(config_path.clone()))?;

    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        config.tracing_level()
    };
    let subscriber = tracing_subscriber::fmt().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    tracing::info!(config = %config_path.display(), "tunnelmon starting");

    // An unreachable system bus at startup is the one fatal condition;
    // everything after this point recovers locally
    let directory = SystemdDirectory::new().await?;
    let journal = JournalReader::new();

    let monitor = Monitor::new(
        config,
        config_path,
        Arc::new(directory),
        Arc::new(journal),
    );

    if cli.once {
        monitor.run_cycle_once().await?;
        return Ok(());
    }

    monitor.start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    monitor.stop().await;

    Ok(())
}
