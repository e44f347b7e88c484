mod config;
mod limiter;
mod model;
mod monitor;
mod notifier;
mod pricesource;
mod storage;
mod tracker;
mod utils;

use config::{AppConfig, load_config};
use limiter::RateLimiter;
use monitor::PriceMonitor;
use notifier::{DealNotifier, TelegramNotifier};
use pricesource::{KeepaClient, PriceSource};
use std::sync::Arc;
use storage::SqliteStorage;
use tokio::sync::{Mutex, Notify};
use tracker::Tracker;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Set panic hook to log details about any panic
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("panic occurred: {:?}", panic_info);
    }));

    // Load configuration from file; bad credentials are the only thing
    // allowed to kill the process.
    let config: Arc<AppConfig> = match load_config("config.json") {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            error!("Config load error: {}", e);
            return;
        }
    };

    // Initialize storage (SQLite) with async access (wrapped in a Mutex)
    let storage = match SqliteStorage::new(&config.database_path) {
        Ok(s) => Arc::new(Mutex::new(s)),
        Err(e) => {
            error!("Failed to initialize storage: {:?}", e);
            return;
        }
    };

    // Price source, shared rate limiter and the core tracking API
    let source: Arc<dyn PriceSource> = Arc::new(KeepaClient::new(
        config.price_api_key.clone(),
        config.price_api_domain,
        config.stats_window_days,
    ));
    let limiter = Arc::new(RateLimiter::new(config.max_requests_per_minute));
    let tracker = Arc::new(Tracker::new(
        storage.clone(),
        source.clone(),
        limiter.clone(),
        config.max_items_per_owner,
    ));

    // Telegram surface: command listener plus alert delivery
    let refresh_notify = Arc::new(Notify::new());
    let notifier = Arc::new(TelegramNotifier::new(
        storage.clone(),
        tracker,
        config.clone(),
        refresh_notify.clone(),
    ));

    if let Err(e) = notifier.set_my_commands().await {
        warn!("setMyCommands failed: {:?}", e);
    }
    TelegramNotifier::spawn_listener(notifier.clone());

    if let Some(admin_chat) = config.telegram_admin_chat_id {
        info!("Sending startup message...");
        if let Err(e) = notifier.notify_text(admin_chat, "🚀 Price sniper started!").await {
            warn!("Startup notification failed: {:?}", e);
        }
    }

    // The polling loop
    let monitor = Arc::new(PriceMonitor::new(
        storage,
        source,
        notifier.clone() as Arc<dyn DealNotifier>,
        limiter,
        config,
        refresh_notify,
    ));
    let handle = monitor.start();

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown requested, stopping monitor...");
    monitor.stop();
    if let Some(handle) = handle {
        if let Err(e) = handle.await {
            warn!("Monitor task ended abnormally: {:?}", e);
        }
    }
}
