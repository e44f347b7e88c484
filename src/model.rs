// Core structs: TrackedItem, PriceObservation, adapter payloads, error enums
use chrono::{DateTime, Utc};

/// A product some chat is watching. One row per (owner, asin).
#[derive(Debug, Clone)]
pub struct TrackedItem {
    pub id: i64,
    pub owner: i64,
    pub asin: String,
    pub title: String,
    pub url: String,
    pub target_price: f64,
    pub last_price: Option<f64>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One price reading for a tracked item. Append-only.
#[derive(Debug, Clone)]
pub struct PriceObservation {
    pub item_id: i64,
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

/// The adapter's answer to "what does it cost right now".
#[derive(Debug, Clone, Copy)]
pub struct PriceSnapshot {
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

/// Full product record used by the add flow and /search detail.
#[derive(Debug, Clone)]
pub struct ProductInfo {
    pub asin: String,
    pub title: String,
    pub url: String,
    pub current_price: Option<f64>,
    pub window_low: Option<f64>,
    pub window_high: Option<f64>,
    pub all_time_low: Option<f64>,
}

/// Keyword search hit.
#[derive(Debug, Clone)]
pub struct ItemCandidate {
    pub asin: String,
    pub title: String,
    pub current_price: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum PriceSourceError {
    #[error("unknown product identifier")]
    NotFound,
    #[error("price source unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for PriceSourceError {
    fn from(e: reqwest::Error) -> Self {
        PriceSourceError::Unavailable(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("not found")]
    NotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("telegram api error: {0}")]
    Api(String),
    #[error("telegram unreachable")]
    Unreachable,
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("target price must be greater than zero")]
    InvalidTarget,
    #[error("item limit reached ({0} items)")]
    LimitReached(usize),
    #[error("not an amazon product link or ASIN")]
    BadIdentifier,
    #[error(transparent)]
    Source(#[from] PriceSourceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
