use std::sync::Arc;

use doc_collect::channels::TelegramChannel;
use doc_collect::collect::CollectManager;
use doc_collect::config::BotConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env().map_err(|e| {
        eprintln!("Error: {e}");
        e
    })?;

    eprintln!("📑 Doc Collect v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Stages: {}", config.stages.len());
    eprintln!("   Scratch: {}", config.scratch_dir.display());
    eprintln!(
        "   Allowed users: {}",
        if config.allowed_users.iter().any(|u| u == "*") {
            "everyone".to_string()
        } else {
            config.allowed_users.join(", ")
        }
    );

    let channel = Arc::new(TelegramChannel::new(
        config.bot_token.clone(),
        config.allowed_users.clone(),
    ));

    // Advertise the command surface in the Telegram client menu
    if let Err(e) = channel
        .set_my_commands(&[
            ("start", "🔄 Start a new collection"),
            ("done", "✅ Build the combined PDF"),
            ("cancel", "❌ Cancel the current collection"),
        ])
        .await
    {
        tracing::warn!("setMyCommands failed: {e}");
    }

    let manager = CollectManager::new(channel, config.stages, config.scratch_dir);

    eprintln!("   Bot running. Ctrl+C to stop.\n");
    manager.run().await?;

    Ok(())
}
