pub mod command_handler;
pub mod dialogue;
pub mod listener;
pub mod sender;

use crate::config::AppConfig;
use crate::model::{NotifyError, TrackedItem};
use crate::notifier::DealNotifier;
use crate::storage::SqliteStorage;
use crate::tracker::Tracker;
use chrono::{Duration as ChronoDuration, Utc};
use dialogue::DialogueStore;
use reqwest::Client;
use std::sync::Arc;
use std::sync::atomic::AtomicI64;
use std::time::Instant;
use tokio::sync::{Mutex, Notify};

pub struct TelegramNotifier {
    pub bot_token: String,
    pub client: Client,
    pub offset: Arc<AtomicI64>,
    pub storage: Arc<Mutex<SqliteStorage>>,
    pub tracker: Arc<Tracker>,
    pub config: Arc<AppConfig>,
    pub dialogues: DialogueStore,
    pub start_time: Instant,
    pub refresh_notify: Arc<Notify>,
}

impl TelegramNotifier {
    pub fn new(
        storage: Arc<Mutex<SqliteStorage>>,
        tracker: Arc<Tracker>,
        config: Arc<AppConfig>,
        refresh_notify: Arc<Notify>,
    ) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to create HTTP client");
        Self {
            bot_token: config.telegram_bot_token.clone(),
            client,
            offset: Arc::new(AtomicI64::new(0)),
            storage,
            tracker,
            dialogues: DialogueStore::new(tokio::time::Duration::from_secs(
                config.dialogue_timeout_seconds,
            )),
            config,
            start_time: Instant::now(),
            refresh_notify,
        }
    }

    pub async fn notify_text(&self, chat_id: i64, text: &str) -> Result<(), NotifyError> {
        sender::send_text(self, chat_id, text).await
    }

    pub async fn listen_for_updates(&self) {
        listener::listen_for_updates(self).await;
    }

    pub async fn set_my_commands(&self) -> Result<(), reqwest::Error> {
        let url = format!("https://api.telegram.org/bot{}/setMyCommands", self.bot_token);
        let commands = serde_json::json!({
            "commands": [
                { "command": "start", "description": "Welcome and usage" },
                { "command": "add", "description": "Track a new product" },
                { "command": "list", "description": "Your tracked products" },
                { "command": "remove", "description": "Stop tracking a product" },
                { "command": "history", "description": "Recent price checks for a product" },
                { "command": "search", "description": "Search products by keyword" },
                { "command": "cancel", "description": "Abort the current add flow" },
                { "command": "status", "description": "Tracker status" },
                { "command": "refresh", "description": "Check prices now" },
                { "command": "uptime", "description": "Service uptime" },
                { "command": "ping", "description": "Check connection" },
                { "command": "help", "description": "Command list" }
            ]
        });
        self.client.post(&url).json(&commands).send().await?;
        Ok(())
    }

    pub fn spawn_listener(notifier: Arc<TelegramNotifier>) {
        tokio::spawn(async move {
            tracing::info!("starting Telegram listener...");
            notifier.listen_for_updates().await;
            tracing::info!("Telegram listener ended.");
        });
    }
}

#[async_trait::async_trait]
impl DealNotifier for TelegramNotifier {
    async fn notify_price_drop(&self, item: &TrackedItem, price: f64) -> Result<(), NotifyError> {
        let window_start = Utc::now() - ChronoDuration::days(self.config.stats_window_days);
        let window_low = self
            .storage
            .lock()
            .await
            .window_low(item.id, window_start)
            .unwrap_or(None);
        sender::send_price_drop(self, item, price, window_low).await
    }
}
