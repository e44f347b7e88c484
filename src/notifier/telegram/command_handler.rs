// notifier/telegram/command_handler.rs

use crate::model::{PriceSourceError, TrackerError};
use crate::notifier::telegram::TelegramNotifier;
use crate::notifier::telegram::dialogue::{AddState, SessionPoll};
use tracing::{info, warn};

const WELCOME_TEXT: &str = "👋 Welcome to the price sniper!\n\n\
    I watch Amazon products for you and ping you when a price drops \
    below your target.\n\n\
    /add — track a new product\n\
    /list — your tracked products\n\
    /help — all commands";

const HELP_TEXT: &str = "📋 Available commands:\n\
    /add — track a new product (send me a link, then a target price)\n\
    /list — your tracked products\n\
    /remove <asin> — stop tracking a product\n\
    /history <asin> — recent price checks for a product\n\
    /search <keyword> — look up products by keyword\n\
    /cancel — abort the current add flow\n\
    /status — tracker status\n\
    /refresh — check prices now\n\
    /uptime — service uptime\n\
    /ping — check connection\n\
    /help — this list";

/// Entry point for every incoming text message: commands go to the
/// command match, everything else feeds the add dialogue.
pub async fn handle_message(chat_id: i64, text: &str, notifier: &TelegramNotifier) {
    let trimmed = text.trim();
    if trimmed.starts_with('/') {
        handle_command(chat_id, trimmed, notifier).await;
    } else {
        handle_dialogue_input(chat_id, trimmed, notifier).await;
    }
}

async fn reply(notifier: &TelegramNotifier, chat_id: i64, text: &str) {
    if let Err(e) = notifier.notify_text(chat_id, text).await {
        warn!("reply to {} failed: {:?}", chat_id, e);
    }
}

async fn handle_command(chat_id: i64, text: &str, notifier: &TelegramNotifier) {
    info!("handling command from {}: {}", chat_id, text);
    let mut parts = text.split_whitespace();
    let command = parts
        .next()
        .and_then(|c| c.split('@').next())
        .unwrap_or("");
    let arg = parts.collect::<Vec<_>>().join(" ");

    match command {
        "/start" => {
            reply(notifier, chat_id, WELCOME_TEXT).await;
        }
        "/help" => {
            reply(notifier, chat_id, HELP_TEXT).await;
        }
        "/ping" => {
            reply(notifier, chat_id, "✅ I am online!").await;
        }
        "/uptime" => {
            let uptime = notifier.start_time.elapsed();
            let msg = format!(
                "⏱ Uptime: {:02}:{:02}:{:02}",
                uptime.as_secs() / 3600,
                (uptime.as_secs() % 3600) / 60,
                uptime.as_secs() % 60
            );
            reply(notifier, chat_id, &msg).await;
        }
        "/status" => match notifier.tracker.list_items(chat_id).await {
            Ok(items) => {
                let msg = format!(
                    "📊 Tracking {} product(s) in this chat.\nPrices are checked every {}s.",
                    items.len(),
                    notifier.config.check_interval_seconds
                );
                reply(notifier, chat_id, &msg).await;
            }
            Err(e) => {
                warn!("/status error: {:?}", e);
                reply(notifier, chat_id, "❌ Could not read tracker state.").await;
            }
        },
        "/refresh" => {
            info!("/refresh received, waking the monitor...");
            notifier.refresh_notify.notify_one();
            reply(notifier, chat_id, "🔄 Price check triggered.").await;
        }
        "/add" => {
            match notifier.tracker.list_items(chat_id).await {
                Ok(items) if items.len() >= notifier.config.max_items_per_owner => {
                    let msg = format!(
                        "⚠️ You already track {} products, which is the limit.\n\
                         Remove one first with /remove <asin>.",
                        items.len()
                    );
                    reply(notifier, chat_id, &msg).await;
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("/add precheck error: {:?}", e);
                }
            }
            notifier.dialogues.begin(chat_id).await;
            reply(
                notifier,
                chat_id,
                "📦 Send me the Amazon link (or ASIN) of the product to track:",
            )
            .await;
        }
        "/cancel" => {
            if notifier.dialogues.cancel(chat_id).await {
                reply(notifier, chat_id, "🚫 Add flow cancelled.").await;
            } else {
                reply(notifier, chat_id, "Nothing to cancel.").await;
            }
        }
        "/list" => match notifier.tracker.list_items(chat_id).await {
            Ok(items) if !items.is_empty() => {
                let mut msg = String::from("📝 Your tracked products:\n\n");
                for item in items {
                    msg.push_str(&format!("📦 {} [{}]\n", item.title, item.asin));
                    msg.push_str(&format!("🎯 Target: {:.2}\n", item.target_price));
                    match item.last_price {
                        Some(price) => msg.push_str(&format!("💰 Last price: {:.2}\n", price)),
                        None => msg.push_str("💰 Last price: not checked yet\n"),
                    }
                    if let Some(checked) = item.last_checked_at {
                        msg.push_str(&format!(
                            "🔄 Last check: {}\n",
                            checked.format("%Y-%m-%d %H:%M UTC")
                        ));
                    }
                    msg.push_str(&format!(
                        "🗓 Tracked since: {}\n",
                        item.created_at.format("%Y-%m-%d")
                    ));
                    msg.push_str(&format!("🔗 {}\n\n", item.url));
                }
                reply(notifier, chat_id, &msg).await;
            }
            Ok(_) => {
                reply(
                    notifier,
                    chat_id,
                    "📭 You are not tracking anything yet. Use /add to start.",
                )
                .await;
            }
            Err(e) => {
                warn!("/list error: {:?}", e);
                reply(notifier, chat_id, "❌ Could not load your products.").await;
            }
        },
        "/remove" => {
            if arg.is_empty() {
                reply(notifier, chat_id, "Usage: /remove <asin> — see /list for the ids.").await;
                return;
            }
            match notifier.tracker.remove_item(chat_id, &arg.to_ascii_uppercase()).await {
                Ok(true) => {
                    reply(notifier, chat_id, "❌ Product removed from tracking.").await;
                }
                Ok(false) => {
                    reply(notifier, chat_id, "🤷 You are not tracking that product.").await;
                }
                Err(e) => {
                    warn!("/remove error: {:?}", e);
                    reply(notifier, chat_id, "❌ Removal failed, try again later.").await;
                }
            }
        }
        "/history" => {
            if arg.is_empty() {
                reply(notifier, chat_id, "Usage: /history <asin> — see /list for the ids.").await;
                return;
            }
            let asin = arg.to_ascii_uppercase();
            let storage = notifier.storage.lock().await;
            let item = match storage.get_item(chat_id, &asin) {
                Ok(Some(item)) => item,
                Ok(None) => {
                    drop(storage);
                    reply(notifier, chat_id, "🤷 You are not tracking that product.").await;
                    return;
                }
                Err(e) => {
                    drop(storage);
                    warn!("/history error: {:?}", e);
                    reply(notifier, chat_id, "❌ Could not load the history.").await;
                    return;
                }
            };
            match storage.observations_for_item(item.id) {
                Ok(observations) if !observations.is_empty() => {
                    drop(storage);
                    let mut msg = format!("📈 Price history for {}:\n\n", item.title);
                    let tail = observations.len().saturating_sub(10);
                    for obs in &observations[tail..] {
                        msg.push_str(&format!(
                            "{} — {:.2}\n",
                            obs.observed_at.format("%Y-%m-%d %H:%M"),
                            obs.price
                        ));
                    }
                    reply(notifier, chat_id, &msg).await;
                }
                Ok(_) => {
                    drop(storage);
                    reply(notifier, chat_id, "📭 No price checks recorded yet.").await;
                }
                Err(e) => {
                    drop(storage);
                    warn!("/history error: {:?}", e);
                    reply(notifier, chat_id, "❌ Could not load the history.").await;
                }
            }
        }
        "/search" => {
            if arg.is_empty() {
                reply(notifier, chat_id, "Usage: /search <keyword>").await;
                return;
            }
            match notifier.tracker.search(&arg).await {
                Ok(hits) if !hits.is_empty() => {
                    let mut msg = format!("🔍 Results for '{}':\n\n", arg);
                    for hit in hits.iter().take(5) {
                        match hit.current_price {
                            Some(price) => msg.push_str(&format!(
                                "📦 {} [{}] — {:.2}\n",
                                hit.title, hit.asin, price
                            )),
                            None => msg.push_str(&format!(
                                "📦 {} [{}] — no offer\n",
                                hit.title, hit.asin
                            )),
                        }
                    }
                    msg.push_str("\nUse /add with an ASIN to track one.");
                    reply(notifier, chat_id, &msg).await;
                }
                Ok(_) => {
                    reply(notifier, chat_id, "📭 No products found for that keyword.").await;
                }
                Err(e) => {
                    warn!("/search error: {:?}", e);
                    reply(notifier, chat_id, "❌ Search failed, try again later.").await;
                }
            }
        }
        _ => {
            reply(
                notifier,
                chat_id,
                "🤖 Unknown command. Type /help for a list of commands.",
            )
            .await;
        }
    }
}

/// Non-command text only makes sense inside the add flow.
async fn handle_dialogue_input(chat_id: i64, text: &str, notifier: &TelegramNotifier) {
    match notifier.dialogues.take(chat_id).await {
        SessionPoll::None => {
            reply(
                notifier,
                chat_id,
                "🤖 I did not get that. Use /add to track a product or /help for commands.",
            )
            .await;
        }
        SessionPoll::Expired => {
            reply(notifier, chat_id, "⏳ Session expired. Start again with /add.").await;
        }
        SessionPoll::Active(AddState::AwaitingProduct) => {
            handle_product_step(chat_id, text, notifier).await;
        }
        SessionPoll::Active(AddState::AwaitingTarget { info }) => {
            handle_target_step(chat_id, text, info, notifier).await;
        }
    }
}

async fn handle_product_step(chat_id: i64, text: &str, notifier: &TelegramNotifier) {
    match notifier.tracker.lookup(text).await {
        Ok(info) => {
            let mut msg = format!("✅ Found: {}\n\n", info.title);
            match info.current_price {
                Some(price) => msg.push_str(&format!("💰 Current price: {:.2}\n", price)),
                None => msg.push_str("💰 Currently no offer\n"),
            }
            if let (Some(low), Some(high)) = (info.window_low, info.window_high) {
                msg.push_str(&format!("📊 Recent range: {:.2} – {:.2}\n", low, high));
            }
            if let Some(low) = info.all_time_low {
                msg.push_str(&format!("📉 All-time low: {:.2}\n", low));
            }
            msg.push_str("\nNow send me the target price (e.g. 29.99):");
            notifier
                .dialogues
                .put(chat_id, AddState::AwaitingTarget { info })
                .await;
            reply(notifier, chat_id, &msg).await;
        }
        Err(TrackerError::BadIdentifier) => {
            // Stay on this step; the user can paste a better link.
            notifier.dialogues.put(chat_id, AddState::AwaitingProduct).await;
            reply(
                notifier,
                chat_id,
                "❌ That does not look like an Amazon link or ASIN. Try again, or /cancel.",
            )
            .await;
        }
        Err(TrackerError::Source(PriceSourceError::NotFound)) => {
            reply(
                notifier,
                chat_id,
                "❌ Product not found. Check the link and start again with /add.",
            )
            .await;
        }
        Err(e) => {
            warn!("product lookup failed for {}: {:?}", chat_id, e);
            reply(
                notifier,
                chat_id,
                "❌ Could not reach the price source. Start again with /add.",
            )
            .await;
        }
    }
}

async fn handle_target_step(
    chat_id: i64,
    text: &str,
    info: crate::model::ProductInfo,
    notifier: &TelegramNotifier,
) {
    let Some(target) = crate::utils::parse_price(text) else {
        // Invalid number: stay on this step.
        notifier
            .dialogues
            .put(chat_id, AddState::AwaitingTarget { info })
            .await;
        reply(
            notifier,
            chat_id,
            "❌ Invalid price. Send a number like 29.99, or /cancel.",
        )
        .await;
        return;
    };

    match notifier.tracker.add_item(chat_id, &info, target).await {
        Ok(item) => {
            let mut msg = format!(
                "✅ Tracking activated!\n\n📦 {}\n🎯 Target: {:.2}\n",
                item.title, item.target_price
            );
            if let Some(price) = item.last_price {
                msg.push_str(&format!("💰 Current price: {:.2}\n", price));
            }
            msg.push_str("\nI will ping you when the price drops below the target!");
            reply(notifier, chat_id, &msg).await;
        }
        Err(TrackerError::LimitReached(limit)) => {
            let msg = format!(
                "⚠️ You already track {} products, which is the limit.\n\
                 Remove one first with /remove <asin>.",
                limit
            );
            reply(notifier, chat_id, &msg).await;
        }
        Err(e) => {
            warn!("add_item failed for {}: {:?}", chat_id, e);
            reply(notifier, chat_id, "❌ Could not save the product, try again with /add.").await;
        }
    }
}
