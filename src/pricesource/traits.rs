use crate::model::{ItemCandidate, PriceSnapshot, PriceSourceError, ProductInfo};

/// Narrow interface the core depends on. Callers must hold a rate-limiter
/// slot before invoking any of these.
#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    /// Current price for a product id. `NotFound` when the id is unknown,
    /// `Unavailable` on transient failure or when no live offer exists.
    async fn current_price(&self, asin: &str) -> Result<PriceSnapshot, PriceSourceError>;

    /// Full record for the add flow: title, current price, window min/max.
    async fn product_info(&self, asin: &str) -> Result<ProductInfo, PriceSourceError>;

    /// Keyword search. Chat-flow only; the polling loop never calls this.
    async fn search(&self, keyword: &str) -> Result<Vec<ItemCandidate>, PriceSourceError>;
}
