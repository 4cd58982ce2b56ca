mod command;
mod config;
mod llm;
mod platform;
mod prompt;
mod relay;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::llm::CompletionClient;
use crate::relay::Relay;

fn default_log_filter(debug_mode: bool) -> &'static str {
    if debug_mode {
        "info,promptbot=debug,teloxide=debug"
    } else {
        "info"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    dotenvy::dotenv().ok();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_log_filter(config.settings.debug_mode).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Configuration loaded from: {}", config_path.display());
    info!("  Model: {}", llm::MODEL);
    info!("  Completion endpoint: {}", config.openai.effective_base_url());
    info!("  Debug mode: {}", config.settings.debug_mode);

    let config = Arc::new(config);
    let bot = Bot::new(&config.telegram.bot_token);
    let completer = Arc::new(CompletionClient::new(&config.openai));
    let relay = Arc::new(Relay::new(config.clone(), completer));

    info!("Bot is starting...");
    platform::telegram::run(relay, bot).await?;

    Ok(())
}
