use crate::limiter::RateLimiter;
use crate::model::{ItemCandidate, ProductInfo, TrackedItem, TrackerError};
use crate::pricesource::PriceSource;
use crate::storage::SqliteStorage;
use crate::utils::extract_asin;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// The only entry points the chat layer may call: look up a product,
/// start/stop tracking it, list what an owner tracks. All outbound price
/// lookups go through the shared rate limiter.
pub struct Tracker {
    storage: Arc<Mutex<SqliteStorage>>,
    source: Arc<dyn PriceSource>,
    limiter: Arc<RateLimiter>,
    max_items_per_owner: usize,
}

impl Tracker {
    pub fn new(
        storage: Arc<Mutex<SqliteStorage>>,
        source: Arc<dyn PriceSource>,
        limiter: Arc<RateLimiter>,
        max_items_per_owner: usize,
    ) -> Self {
        Self {
            storage,
            source,
            limiter,
            max_items_per_owner,
        }
    }

    /// Resolves a pasted Amazon link or bare ASIN to a product record.
    pub async fn lookup(&self, query: &str) -> Result<ProductInfo, TrackerError> {
        let asin = extract_asin(query).ok_or(TrackerError::BadIdentifier)?;
        self.limiter.acquire().await;
        Ok(self.source.product_info(&asin).await?)
    }

    /// Starts tracking a product for an owner. Re-adding an already
    /// tracked product updates its target price in place.
    pub async fn add_item(
        &self,
        owner: i64,
        info: &ProductInfo,
        target_price: f64,
    ) -> Result<TrackedItem, TrackerError> {
        if !(target_price > 0.0) || !target_price.is_finite() {
            return Err(TrackerError::InvalidTarget);
        }

        let mut storage = self.storage.lock().await;
        let already_tracked = storage.get_item(owner, &info.asin)?.is_some();
        if !already_tracked && storage.count_for_owner(owner)? >= self.max_items_per_owner {
            return Err(TrackerError::LimitReached(self.max_items_per_owner));
        }

        let item = storage.upsert_item(owner, &info.asin, &info.title, &info.url, target_price)?;

        // Seed the history with the price seen during the add flow, so
        // the first cycle already has a baseline.
        if !already_tracked {
            if let Some(price) = info.current_price {
                storage.record_check(item.id, price, chrono::Utc::now())?;
            }
        }

        info!("owner {} now tracks {} at target {:.2}", owner, info.asin, target_price);
        storage.get_item(owner, &info.asin)?.ok_or(TrackerError::Storage(
            crate::model::StorageError::NotFound,
        ))
    }

    pub async fn remove_item(&self, owner: i64, asin: &str) -> Result<bool, TrackerError> {
        let removed = self.storage.lock().await.delete_item(owner, asin)?;
        if removed {
            info!("owner {} stopped tracking {}", owner, asin);
        }
        Ok(removed)
    }

    pub async fn list_items(&self, owner: i64) -> Result<Vec<TrackedItem>, TrackerError> {
        Ok(self.storage.lock().await.items_for_owner(owner)?)
    }

    pub async fn search(&self, keyword: &str) -> Result<Vec<ItemCandidate>, TrackerError> {
        self.limiter.acquire().await;
        Ok(self.source.search(keyword).await?)
    }
}
