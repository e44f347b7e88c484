use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Decides whether a price-drop alert may fire for an item right now.
/// Keyed by tracked-item row id; state lives in memory only, so a
/// restart may re-notify once — the cooldown is best-effort, not a
/// correctness guarantee.
pub struct CooldownGate {
    window: Duration,
    last_sent: Mutex<HashMap<i64, Instant>>,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Fires when the price is at or below target and the item has not
    /// notified within the window. Check and record happen under one
    /// lock, so an immediately-following check cannot double-fire.
    pub async fn check_and_mark(&self, item_id: i64, price: f64, target_price: f64) -> bool {
        if price > target_price {
            return false;
        }
        let mut last_sent = self.last_sent.lock().await;
        let now = Instant::now();
        match last_sent.get(&item_id) {
            Some(sent_at) if now.duration_since(*sent_at) < self.window => false,
            _ => {
                last_sent.insert(item_id, now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn below_target_twice_in_window_fires_once() {
        let gate = CooldownGate::new(Duration::from_secs(3600));
        assert!(gate.check_and_mark(1, 45.0, 50.0).await);
        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(!gate.check_and_mark(1, 40.0, 50.0).await);
    }

    #[tokio::test(start_paused = true)]
    async fn fires_again_after_window_elapses() {
        let gate = CooldownGate::new(Duration::from_secs(3600));
        assert!(gate.check_and_mark(1, 45.0, 50.0).await);
        tokio::time::advance(Duration::from_secs(3601)).await;
        assert!(gate.check_and_mark(1, 45.0, 50.0).await);
    }

    #[tokio::test(start_paused = true)]
    async fn above_target_never_fires_nor_marks() {
        let gate = CooldownGate::new(Duration::from_secs(3600));
        assert!(!gate.check_and_mark(1, 55.0, 50.0).await);
        // No cooldown was started by the non-fire above.
        assert!(gate.check_and_mark(1, 50.0, 50.0).await);
    }

    #[tokio::test(start_paused = true)]
    async fn items_cool_down_independently() {
        let gate = CooldownGate::new(Duration::from_secs(3600));
        assert!(gate.check_and_mark(1, 45.0, 50.0).await);
        assert!(gate.check_and_mark(2, 9.0, 10.0).await);
        assert!(!gate.check_and_mark(1, 44.0, 50.0).await);
    }
}
