// Keepa-style price API client. Prices arrive as cent values in a flat
// [minutes, cents, minutes, cents, ...] series per product; a negative
// cent value means no live offer at that point in time.
use crate::model::{ItemCandidate, PriceSnapshot, PriceSourceError, ProductInfo};
use crate::pricesource::traits::PriceSource;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::debug;

/// Keepa timestamps are minutes since its own epoch; adding this offset
/// yields minutes since the Unix epoch.
const KEEPA_EPOCH_OFFSET_MINUTES: i64 = 21_564_000;

const DEFAULT_BASE_URL: &str = "https://api.keepa.com";

/// Responses for the interactive flows are cached briefly; the polling
/// loop's `current_price` path never reads the cache.
const CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct ProductResponse {
    #[serde(default)]
    products: Vec<RawProduct>,
}

#[derive(Debug, Deserialize)]
struct RawProduct {
    asin: String,
    #[serde(default)]
    title: Option<String>,
    /// Index 0 is the Amazon price series; indices can be null.
    #[serde(default)]
    csv: Option<Vec<Option<Vec<i64>>>>,
}

pub struct KeepaClient {
    client: Client,
    base_url: String,
    api_key: String,
    domain: u8,
    stats_window: ChronoDuration,
    info_cache: Mutex<HashMap<String, (ProductInfo, Instant)>>,
    search_cache: Mutex<HashMap<String, (Vec<ItemCandidate>, Instant)>>,
}

impl KeepaClient {
    pub fn new(api_key: String, domain: u8, stats_window_days: i64) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("PriceSniperBot/0.1")
            .build()
            .expect("failed to create HTTP client");
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            domain,
            stats_window: ChronoDuration::days(stats_window_days),
            info_cache: Mutex::new(HashMap::new()),
            search_cache: Mutex::new(HashMap::new()),
        }
    }

    fn product_url(&self, asin: &str) -> String {
        format!("https://www.amazon.{}/dp/{}", domain_tld(self.domain), asin)
    }

    async fn query_product(&self, asin: &str) -> Result<RawProduct, PriceSourceError> {
        let url = format!("{}/product", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("domain", &self.domain.to_string()),
                ("asin", asin),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PriceSourceError::NotFound);
        }
        if !status.is_success() {
            return Err(PriceSourceError::Unavailable(format!(
                "price API responded {status}"
            )));
        }

        let body: ProductResponse = response
            .json()
            .await
            .map_err(|e| PriceSourceError::Unavailable(format!("bad payload: {e}")))?;
        body.products
            .into_iter()
            .next()
            .ok_or(PriceSourceError::NotFound)
    }
}

#[async_trait::async_trait]
impl PriceSource for KeepaClient {
    async fn current_price(&self, asin: &str) -> Result<PriceSnapshot, PriceSourceError> {
        let raw = self.query_product(asin).await?;
        match current_price_of(&raw) {
            Some(price) => Ok(PriceSnapshot {
                price,
                observed_at: Utc::now(),
            }),
            // The product exists but has no live offer right now; the
            // next cycle is the retry.
            None => Err(PriceSourceError::Unavailable("no live offer".into())),
        }
    }

    async fn product_info(&self, asin: &str) -> Result<ProductInfo, PriceSourceError> {
        {
            let cache = self.info_cache.lock().await;
            if let Some((info, stored_at)) = cache.get(asin) {
                if stored_at.elapsed() < CACHE_TTL {
                    debug!("cache hit for product {}", asin);
                    return Ok(info.clone());
                }
            }
        }

        let raw = self.query_product(asin).await?;
        let points = decode_price_series(&raw);
        let window_start = Utc::now() - self.stats_window;
        let window: Vec<f64> = points
            .iter()
            .filter(|(t, _)| *t >= window_start)
            .map(|(_, p)| *p)
            .collect();

        let info = ProductInfo {
            asin: raw.asin.clone(),
            title: raw.title.clone().unwrap_or_else(|| "(no title)".to_string()),
            url: self.product_url(&raw.asin),
            current_price: current_price_of(&raw),
            window_low: window.iter().copied().reduce(f64::min),
            window_high: window.iter().copied().reduce(f64::max),
            all_time_low: points.iter().map(|(_, p)| *p).reduce(f64::min),
        };

        self.info_cache
            .lock()
            .await
            .insert(asin.to_string(), (info.clone(), Instant::now()));
        Ok(info)
    }

    async fn search(&self, keyword: &str) -> Result<Vec<ItemCandidate>, PriceSourceError> {
        {
            let cache = self.search_cache.lock().await;
            if let Some((hits, stored_at)) = cache.get(keyword) {
                if stored_at.elapsed() < CACHE_TTL {
                    debug!("cache hit for search '{}'", keyword);
                    return Ok(hits.clone());
                }
            }
        }

        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("domain", &self.domain.to_string()),
                ("type", "product"),
                ("term", keyword),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PriceSourceError::Unavailable(format!(
                "price API responded {status}"
            )));
        }

        let body: ProductResponse = response
            .json()
            .await
            .map_err(|e| PriceSourceError::Unavailable(format!("bad payload: {e}")))?;

        let hits: Vec<ItemCandidate> = body
            .products
            .iter()
            .map(|raw| ItemCandidate {
                asin: raw.asin.clone(),
                title: raw.title.clone().unwrap_or_else(|| "(no title)".to_string()),
                current_price: current_price_of(raw),
            })
            .collect();

        self.search_cache
            .lock()
            .await
            .insert(keyword.to_string(), (hits.clone(), Instant::now()));
        Ok(hits)
    }
}

fn domain_tld(domain: u8) -> &'static str {
    match domain {
        2 => "co.uk",
        3 => "de",
        4 => "fr",
        5 => "co.jp",
        6 => "ca",
        8 => "it",
        9 => "es",
        _ => "com",
    }
}

fn keepa_minutes_to_utc(minutes: i64) -> DateTime<Utc> {
    Utc.timestamp_opt((minutes + KEEPA_EPOCH_OFFSET_MINUTES) * 60, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Expands the flat [minutes, cents, ...] Amazon series into timestamped
/// prices, skipping the no-offer markers.
fn decode_price_series(raw: &RawProduct) -> Vec<(DateTime<Utc>, f64)> {
    let Some(series) = raw.csv.as_ref().and_then(|csv| csv.first()).and_then(|s| s.as_ref())
    else {
        return Vec::new();
    };

    series
        .chunks_exact(2)
        .filter(|pair| pair[1] > 0)
        .map(|pair| (keepa_minutes_to_utc(pair[0]), pair[1] as f64 / 100.0))
        .collect()
}

/// The latest series entry is the live price; a negative tail means the
/// product currently has no offer.
fn current_price_of(raw: &RawProduct) -> Option<f64> {
    let series = raw.csv.as_ref()?.first()?.as_ref()?;
    let cents = *series.chunks_exact(2).last()?.get(1)?;
    if cents > 0 { Some(cents as f64 / 100.0) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(csv: Vec<i64>) -> RawProduct {
        RawProduct {
            asin: "B000TEST01".to_string(),
            title: Some("Test".to_string()),
            csv: Some(vec![Some(csv)]),
        }
    }

    #[test]
    fn keepa_minutes_convert_to_unix_time() {
        // Keepa minute 0 is 2011-01-01 00:00 UTC.
        let t = keepa_minutes_to_utc(0);
        assert_eq!(t.timestamp(), KEEPA_EPOCH_OFFSET_MINUTES * 60);
    }

    #[test]
    fn series_decodes_cents_and_skips_gaps() {
        let points = decode_price_series(&product(vec![100, 2599, 200, -1, 300, 1999]));
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].1, 25.99);
        assert_eq!(points[1].1, 19.99);
        assert!(points[0].0 < points[1].0);
    }

    #[test]
    fn current_price_is_latest_entry() {
        assert_eq!(current_price_of(&product(vec![100, 2599, 300, 1850])), Some(18.50));
    }

    #[test]
    fn unavailable_tail_means_no_current_price() {
        assert_eq!(current_price_of(&product(vec![100, 2599, 300, -1])), None);
    }

    #[test]
    fn empty_series_yields_nothing() {
        let raw = RawProduct {
            asin: "B000TEST01".to_string(),
            title: None,
            csv: None,
        };
        assert!(decode_price_series(&raw).is_empty());
        assert_eq!(current_price_of(&raw), None);
    }
}
