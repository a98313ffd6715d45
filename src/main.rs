//! TrustTunnel Bot - Entry Point
//!
//! Loads `bot.toml` (or the file given with `--config`) and runs the
//! Telegram bot with long polling.

use anyhow::Context;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use trusttunnel_bot::BotConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");
    let json_logs = args.iter().any(|a| a == "--json");
    let config_arg = args
        .iter()
        .position(|a| a == "--config" || a == "-c")
        .and_then(|i| args.get(i + 1))
        .cloned();

    if help_mode {
        println!("TrustTunnel Bot v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: trusttunnel-bot [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --config, -c <path>  Bot config file (default: bot.toml)");
        println!("  --json               Log as JSON to stderr");
        println!("  --help, -h           Show this help");
        println!();
        println!("Environment variables:");
        println!("  TRUSTTUNNEL_BOT_CONFIG  Bot config file");
        println!("  TELEGRAM_BOT_TOKEN      Overrides telegram_token");
        println!("  TRUSTTUNNEL_ADMIN_IDS   Overrides admin_ids (comma separated)");
        println!("  RUST_LOG                Log filter (e.g. info, trusttunnel_bot=debug)");
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let config_path = config_arg
        .or_else(|| std::env::var("TRUSTTUNNEL_BOT_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("bot.toml"));

    info!("TrustTunnel Bot v{}", env!("CARGO_PKG_VERSION"));
    info!("Config: {:?}", config_path);

    let config = BotConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?
        .with_env_overrides();

    trusttunnel_bot::telegram::run_telegram_bot(config).await
}
