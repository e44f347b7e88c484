// The polling loop: fetch prices for the working set on an interval,
// persist observations, and fire rate-limited, cooldown-gated alerts.

pub mod cooldown;

use crate::config::AppConfig;
use crate::limiter::RateLimiter;
use crate::model::{PriceSourceError, StorageError, TrackedItem};
use crate::notifier::DealNotifier;
use crate::pricesource::PriceSource;
use crate::storage::SqliteStorage;
use chrono::{Duration as ChronoDuration, Utc};
use cooldown::CooldownGate;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};
use tracing::{debug, error, info, warn};

pub struct PriceMonitor {
    storage: Arc<Mutex<SqliteStorage>>,
    source: Arc<dyn PriceSource>,
    notifier: Arc<dyn DealNotifier>,
    limiter: Arc<RateLimiter>,
    cooldown: CooldownGate,
    config: Arc<AppConfig>,
    refresh_notify: Arc<Notify>,
    running: AtomicBool,
    stop_flag: AtomicBool,
}

impl PriceMonitor {
    pub fn new(
        storage: Arc<Mutex<SqliteStorage>>,
        source: Arc<dyn PriceSource>,
        notifier: Arc<dyn DealNotifier>,
        limiter: Arc<RateLimiter>,
        config: Arc<AppConfig>,
        refresh_notify: Arc<Notify>,
    ) -> Self {
        Self {
            storage,
            source,
            notifier,
            limiter,
            cooldown: CooldownGate::new(Duration::from_secs(config.notification_cooldown_seconds)),
            config,
            refresh_notify,
            running: AtomicBool::new(false),
            stop_flag: AtomicBool::new(false),
        }
    }

    /// Spawns the repeating check task. Idempotent: while the loop is
    /// already running this is a no-op and returns None.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            info!("price monitor already running");
            return None;
        }
        self.stop_flag.store(false, Ordering::SeqCst);
        let monitor = Arc::clone(self);
        Some(tokio::spawn(async move { monitor.run().await }))
    }

    /// Asks the loop to exit. The flag is observed at the top of each
    /// cycle and before the inter-cycle sleep; an in-flight batch always
    /// runs to completion.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.refresh_notify.notify_one();
    }

    async fn run(&self) {
        info!(
            "price monitor started, checking every {}s",
            self.config.check_interval_seconds
        );
        loop {
            if self.stop_flag.load(Ordering::SeqCst) {
                break;
            }
            if let Err(e) = self.run_cycle().await {
                // Store trouble kills only this cycle; the next interval
                // is the retry.
                error!("price check cycle failed: {e}");
            }
            if self.stop_flag.load(Ordering::SeqCst) {
                break;
            }
            debug!(
                "waiting {}s until the next check",
                self.config.check_interval_seconds
            );
            tokio::select! {
                _ = sleep(Duration::from_secs(self.config.check_interval_seconds)) => {}
                _ = self.refresh_notify.notified() => {
                    info!("manual refresh triggered");
                }
            }
        }
        self.running.store(false, Ordering::SeqCst);
        info!("price monitor stopped");
    }

    /// One pass over every tracked item, in fixed-size batches, strictly
    /// sequential so the rate limiter sees a deterministic call order.
    pub async fn run_cycle(&self) -> Result<(), StorageError> {
        let items = self.storage.lock().await.all_items()?;
        if items.is_empty() {
            debug!("nothing tracked, skipping cycle");
            return Ok(());
        }

        let total_batches = items.len().div_ceil(self.config.batch_size);
        info!(
            "checking {} items in {} batches",
            items.len(),
            total_batches
        );

        for (i, batch) in items.chunks(self.config.batch_size).enumerate() {
            debug!("batch {}/{}: {} items", i + 1, total_batches, batch.len());
            for item in batch {
                self.check_item(item).await;
            }
        }

        let cutoff = Utc::now() - ChronoDuration::days(self.config.price_history_retention_days);
        match self.storage.lock().await.prune_observations(cutoff) {
            Ok(0) => {}
            Ok(n) => debug!("pruned {} stale observations", n),
            Err(e) => warn!("history pruning failed: {e}"),
        }

        Ok(())
    }

    /// Checks a single item. A failure here must never spill over to the
    /// rest of the batch.
    async fn check_item(&self, item: &TrackedItem) {
        self.limiter.acquire().await;

        let snapshot = match self.source.current_price(&item.asin).await {
            Ok(s) => s,
            Err(PriceSourceError::NotFound) => {
                warn!("{}: unknown to the price source, skipping", item.asin);
                return;
            }
            Err(PriceSourceError::Unavailable(reason)) => {
                warn!(
                    "{}: price source unavailable ({}), retrying next cycle",
                    item.asin, reason
                );
                return;
            }
        };

        if let Err(e) = self
            .storage
            .lock()
            .await
            .record_check(item.id, snapshot.price, snapshot.observed_at)
        {
            warn!("{}: failed to persist check: {e}", item.asin);
            return;
        }

        if self
            .cooldown
            .check_and_mark(item.id, snapshot.price, item.target_price)
            .await
        {
            info!(
                "{}: price {:.2} at or below target {:.2}, notifying owner {}",
                item.asin, snapshot.price, item.target_price, item.owner
            );
            if let Err(e) = self.notifier.notify_price_drop(item, snapshot.price).await {
                // Delivered-or-not, the price update above stands.
                warn!("{}: notification delivery failed: {e}", item.asin);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NotifyError, PriceSnapshot};
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};

    /// Scripted price source: each call pops the next response for the asin.
    struct ScriptedSource {
        responses: Mutex<HashMap<String, VecDeque<Result<f64, PriceSourceError>>>>,
    }

    impl ScriptedSource {
        fn new() -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
            }
        }

        async fn script(&self, asin: &str, response: Result<f64, PriceSourceError>) {
            self.responses
                .lock()
                .await
                .entry(asin.to_string())
                .or_default()
                .push_back(response);
        }
    }

    #[async_trait]
    impl PriceSource for ScriptedSource {
        async fn current_price(&self, asin: &str) -> Result<PriceSnapshot, PriceSourceError> {
            let next = self
                .responses
                .lock()
                .await
                .get_mut(asin)
                .and_then(|q| q.pop_front())
                .unwrap_or(Err(PriceSourceError::NotFound));
            next.map(|price| PriceSnapshot {
                price,
                observed_at: Utc::now(),
            })
        }

        async fn product_info(
            &self,
            _asin: &str,
        ) -> Result<crate::model::ProductInfo, PriceSourceError> {
            unimplemented!("not used by the monitor")
        }

        async fn search(
            &self,
            _keyword: &str,
        ) -> Result<Vec<crate::model::ItemCandidate>, PriceSourceError> {
            unimplemented!("not used by the monitor")
        }
    }

    struct RecordingNotifier {
        sent: Mutex<Vec<(String, f64)>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn new(fail: bool) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl DealNotifier for RecordingNotifier {
        async fn notify_price_drop(
            &self,
            item: &TrackedItem,
            price: f64,
        ) -> Result<(), NotifyError> {
            self.sent.lock().await.push((item.asin.clone(), price));
            if self.fail {
                Err(NotifyError::Unreachable)
            } else {
                Ok(())
            }
        }
    }

    fn test_config() -> AppConfig {
        AppConfig {
            telegram_bot_token: "token".to_string(),
            telegram_admin_chat_id: None,
            price_api_key: "key".to_string(),
            price_api_domain: 1,
            database_path: ":memory:".to_string(),
            check_interval_seconds: 300,
            max_requests_per_minute: 1000,
            batch_size: 2,
            notification_cooldown_seconds: 3600,
            price_history_retention_days: 30,
            stats_window_days: 90,
            max_items_per_owner: 5,
            dialogue_timeout_seconds: 300,
        }
    }

    struct Fixture {
        monitor: Arc<PriceMonitor>,
        storage: Arc<Mutex<SqliteStorage>>,
        source: Arc<ScriptedSource>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture(failing_notifier: bool) -> Fixture {
        let storage = Arc::new(Mutex::new(SqliteStorage::new(":memory:").unwrap()));
        let source = Arc::new(ScriptedSource::new());
        let notifier = Arc::new(RecordingNotifier::new(failing_notifier));
        let monitor = Arc::new(PriceMonitor::new(
            storage.clone(),
            source.clone(),
            notifier.clone(),
            Arc::new(RateLimiter::new(1000)),
            Arc::new(test_config()),
            Arc::new(Notify::new()),
        ));
        Fixture {
            monitor,
            storage,
            source,
            notifier,
        }
    }

    async fn add_item(fx: &Fixture, asin: &str, target: f64) -> TrackedItem {
        fx.storage
            .lock()
            .await
            .upsert_item(7, asin, "Widget", "", target)
            .unwrap()
    }

    #[tokio::test]
    async fn drop_below_target_notifies_exactly_once_end_to_end() {
        let fx = fixture(false);
        let item = add_item(&fx, "B000TEST01", 20.0).await;
        fx.source.script("B000TEST01", Ok(25.0)).await;
        fx.source.script("B000TEST01", Ok(18.0)).await;

        // First cycle: above target, no alert, price recorded.
        fx.monitor.run_cycle().await.unwrap();
        assert!(fx.notifier.sent.lock().await.is_empty());
        let reloaded = fx.storage.lock().await.get_item(7, "B000TEST01").unwrap().unwrap();
        assert_eq!(reloaded.last_price, Some(25.0));

        // Second cycle: drop below target fires one alert.
        fx.monitor.run_cycle().await.unwrap();
        let sent = fx.notifier.sent.lock().await;
        assert_eq!(sent.as_slice(), &[("B000TEST01".to_string(), 18.0)]);
        drop(sent);
        let reloaded = fx.storage.lock().await.get_item(7, "B000TEST01").unwrap().unwrap();
        assert_eq!(reloaded.last_price, Some(18.0));
        assert_eq!(
            fx.storage.lock().await.observations_for_item(item.id).unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn price_staying_below_target_respects_cooldown() {
        let fx = fixture(false);
        add_item(&fx, "B000TEST01", 20.0).await;
        fx.source.script("B000TEST01", Ok(18.0)).await;
        fx.source.script("B000TEST01", Ok(17.0)).await;

        fx.monitor.run_cycle().await.unwrap();
        fx.monitor.run_cycle().await.unwrap();
        assert_eq!(fx.notifier.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn unavailable_item_does_not_abort_the_batch() {
        let fx = fixture(false);
        add_item(&fx, "B000TEST01", 20.0).await;
        add_item(&fx, "B000TEST02", 20.0).await;
        add_item(&fx, "B000TEST03", 20.0).await;
        fx.source
            .script("B000TEST01", Err(PriceSourceError::Unavailable("boom".into())))
            .await;
        fx.source.script("B000TEST02", Ok(15.0)).await;
        fx.source.script("B000TEST03", Ok(25.0)).await;

        fx.monitor.run_cycle().await.unwrap();

        // The failed item kept its pristine state, the others were checked.
        let first = fx.storage.lock().await.get_item(7, "B000TEST01").unwrap().unwrap();
        assert!(first.last_price.is_none());
        let second = fx.storage.lock().await.get_item(7, "B000TEST02").unwrap().unwrap();
        assert_eq!(second.last_price, Some(15.0));
        let third = fx.storage.lock().await.get_item(7, "B000TEST03").unwrap().unwrap();
        assert_eq!(third.last_price, Some(25.0));
        assert_eq!(fx.notifier.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn delivery_failure_does_not_roll_back_the_price_update() {
        let fx = fixture(true);
        add_item(&fx, "B000TEST01", 20.0).await;
        fx.source.script("B000TEST01", Ok(18.0)).await;

        fx.monitor.run_cycle().await.unwrap();

        assert_eq!(fx.notifier.sent.lock().await.len(), 1);
        let reloaded = fx.storage.lock().await.get_item(7, "B000TEST01").unwrap().unwrap();
        assert_eq!(reloaded.last_price, Some(18.0));
    }

    #[tokio::test]
    async fn cycle_prunes_stale_observations() {
        let fx = fixture(false);
        let item = add_item(&fx, "B000TEST01", 20.0).await;
        fx.storage
            .lock()
            .await
            .record_check(item.id, 30.0, Utc::now() - ChronoDuration::days(60))
            .unwrap();
        fx.source.script("B000TEST01", Ok(25.0)).await;

        fx.monitor.run_cycle().await.unwrap();

        let history = fx.storage.lock().await.observations_for_item(item.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].price, 25.0);
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent_and_stop_ends_the_loop() {
        let fx = fixture(false);
        let handle = fx.monitor.start().expect("first start spawns the loop");
        assert!(fx.monitor.start().is_none());

        fx.monitor.stop();
        handle.await.unwrap();
    }
}
