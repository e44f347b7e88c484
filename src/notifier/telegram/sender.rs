// notifier/telegram/sender.rs

use crate::model::{NotifyError, TrackedItem};
use crate::notifier::telegram::TelegramNotifier;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Sends a plain text message to a chat.
pub async fn send_text(
    notifier: &TelegramNotifier,
    chat_id: i64,
    text: &str,
) -> Result<(), NotifyError> {
    let url = format!("https://api.telegram.org/bot{}/sendMessage", notifier.bot_token);
    let params = [("chat_id", chat_id.to_string()), ("text", text.to_string())];
    let response = notifier
        .client
        .post(&url)
        .form(&params)
        .send()
        .await
        .map_err(|e| NotifyError::Api(format!("send failed: {e}")))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_else(|_| "unknown".into());
        warn!("Telegram text error [{}]: {}", status, body);
        return Err(NotifyError::Api(format!("status {status}")));
    }
    Ok(())
}

/// Sends a price-drop alert to the item's owner.
pub async fn send_price_drop(
    notifier: &TelegramNotifier,
    item: &TrackedItem,
    price: f64,
    window_low: Option<f64>,
) -> Result<(), NotifyError> {
    let url = format!("https://api.telegram.org/bot{}/sendMessage", notifier.bot_token);
    let mut message = format!(
        "🎯 Price target hit!\n\n📦 {}\n💰 Current: {:.2}\n🎯 Target: {:.2}\n",
        item.title, price, item.target_price
    );
    if let Some(low) = window_low {
        message.push_str(&format!("📉 Recent low: {:.2}\n", low));
    }
    message.push_str(&format!("🔗 {}", item.url));

    info!("sending price alert for {} to chat {}", item.asin, item.owner);
    let response = match timeout(
        Duration::from_secs(10),
        notifier
            .client
            .post(&url)
            .form(&[("chat_id", item.owner.to_string()), ("text", message.clone())])
            .send(),
    )
    .await
    {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            warn!("Telegram send() failed: {:?}", e);
            return Err(NotifyError::Api(format!("send failed: {e}")));
        }
        Err(_) => {
            warn!("Telegram send() timed out");
            return Err(NotifyError::Unreachable);
        }
    };
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_else(|_| "unknown".into());
        warn!("Telegram API responded [{}]: {}", status, body);
        return Err(NotifyError::Unreachable);
    }
    Ok(())
}
