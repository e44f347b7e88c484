// Chat delivery: the seam between the polling loop and Telegram.

pub mod telegram;

use crate::model::{NotifyError, TrackedItem};

/// What the monitor needs from the chat side: deliver one price-drop
/// alert to the item's owner.
#[async_trait::async_trait]
pub trait DealNotifier: Send + Sync {
    async fn notify_price_drop(&self, item: &TrackedItem, price: f64) -> Result<(), NotifyError>;
}

pub use telegram::TelegramNotifier;
