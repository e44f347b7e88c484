// notifier/telegram/listener.rs

use crate::notifier::telegram::TelegramNotifier;
use crate::notifier::telegram::command_handler::handle_message;
use rand::Rng;
use serde::Deserialize;
use tokio::time::{Duration, sleep};
use tracing::warn;

#[derive(Debug, Deserialize)]
struct TelegramApiResponse {
    result: Vec<TelegramUpdate>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    chat: TelegramChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

/// Polls for Telegram updates and dispatches incoming messages.
pub async fn listen_for_updates(notifier: &TelegramNotifier) {
    let url = format!("https://api.telegram.org/bot{}/getUpdates", notifier.bot_token);
    loop {
        let current_offset = notifier.offset.load(std::sync::atomic::Ordering::SeqCst);
        let response = notifier
            .client
            .get(&url)
            .query(&[("offset", (current_offset + 1).to_string())])
            .send()
            .await;

        match response {
            Ok(resp) => match resp.json::<TelegramApiResponse>().await {
                Ok(api_response) => {
                    for update in api_response.result {
                        if let Some(message) = update.message.as_ref() {
                            if let Some(text) = message.text.as_deref() {
                                handle_message(message.chat.id, text, notifier).await;
                            }
                        }
                        notifier
                            .offset
                            .store(update.update_id + 1, std::sync::atomic::Ordering::SeqCst);
                    }
                }
                Err(e) => {
                    warn!("getUpdates payload error: {e}");
                    sleep(backoff_with_jitter()).await;
                }
            },
            Err(e) => {
                warn!("getUpdates request error: {e}");
                sleep(backoff_with_jitter()).await;
            }
        }
        sleep(Duration::from_secs(1)).await;
    }
}

fn backoff_with_jitter() -> Duration {
    Duration::from_millis(5000 + rand::rng().random_range(0..1000))
}
