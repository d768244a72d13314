/// Courier Download Bot - Main Entry Point
///
/// Telegram bot that runs yt-dlp for every link it receives, mirrors the
/// downloader's console output into a single status message and replies with
/// links to the downloaded files.
mod commands;
mod config;
mod dispatch;
mod file_server;
mod notifier;
mod orchestrator;
mod render;
mod workers;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use commands::Command;
use config::BotConfig;
use dispatch::DispatchLoop;
use orchestrator::AppContext;

/// Finished queue entries older than this are forgotten.
const QUEUE_RETENTION_SECS: i64 = 3600;
const INBOUND_QUEUE_SIZE: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let config = BotConfig::from_env()?;

    let level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("courier_bot={}", level).parse()?)
                .add_directive(format!("courier_shared={}", level).parse()?)
                .add_directive(format!("downloader={}", level).parse()?),
        )
        .init();

    info!("=== Courier Download Bot Starting ===");
    info!(
        downloader = %config.downloader_path,
        storage = %config.storage_dir.display(),
        max_concurrent = config.max_concurrent,
        "configuration loaded"
    );

    std::fs::create_dir_all(&config.storage_dir)?;

    let bot = Bot::new(config.token.clone());

    // Fail fast on a bad token
    let me = bot.get_me().await?;
    info!("Logged in as @{}", me.username());

    // Explicitly delete any existing webhook before polling
    // (prevents 409 Conflict if a webhook was previously set)
    match bot.delete_webhook().send().await {
        Ok(_) => info!("Webhook cleared (ready for polling)"),
        Err(e) => warn!("Failed to delete webhook: {} (continuing anyway)", e),
    }

    // Sync commands with Telegram (enables autocomplete menu)
    match bot.set_my_commands(Command::bot_commands()).await {
        Ok(_) => info!("Bot commands synced with Telegram"),
        Err(e) => error!("Failed to sync bot commands: {}", e),
    }

    let shutdown = CancellationToken::new();

    let file_server = match config.http_server {
        Some(addr) => {
            let listener = file_server::bind(addr).await?;
            let app = file_server::router(&config.storage_dir);
            Some(tokio::spawn(file_server::serve(listener, app, shutdown.clone())))
        }
        None => {
            info!("HTTP_SERVER not set, download links must be served externally");
            None
        }
    };

    let ctx = Arc::new(AppContext::new(config, shutdown.clone()));

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_SIZE);
    let dispatch = tokio::spawn(DispatchLoop::new(ctx.clone(), Arc::new(bot.clone()), inbound_rx).run());

    // Periodically forget finished queue entries
    let cleanup_ctx = ctx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            tokio::select! {
                _ = interval.tick() => cleanup_ctx.task_queue.cleanup_old(QUEUE_RETENTION_SECS).await,
                _ = cleanup_ctx.shutdown.cancelled() => break,
            }
        }
    });

    info!("Bot initialized, starting dispatcher...");

    Dispatcher::builder(bot, commands::schema(inbound_tx))
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.kind);
        })
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    // Cleanup on shutdown
    info!("Bot shutting down...");
    shutdown.cancel();
    ctx.task_queue.close();

    if let Err(e) = dispatch.await {
        error!("Dispatch loop panicked: {}", e);
    }
    if let Some(handle) = file_server {
        match handle.await {
            Ok(Err(e)) => error!("File server error: {}", e),
            Err(e) => error!("File server panicked: {}", e),
            Ok(Ok(())) => {}
        }
    }

    info!("Courier Download Bot stopped.");
    Ok(())
}
