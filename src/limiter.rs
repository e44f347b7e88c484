use std::collections::VecDeque;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, sleep};

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window limiter for outbound price-API calls. `acquire()`
/// suspends until a slot frees up; it never fails and keeps no more than
/// `max_per_minute` recorded calls inside any rolling 60s window. Not a
/// token bucket: bursts beyond the count are impossible.
pub struct RateLimiter {
    max_per_minute: usize,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_per_minute: usize) -> Self {
        Self {
            max_per_minute,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                while let Some(front) = calls.front() {
                    if now.duration_since(*front) >= WINDOW {
                        calls.pop_front();
                    } else {
                        break;
                    }
                }
                if calls.len() < self.max_per_minute {
                    calls.push_back(now);
                    return;
                }
                // Oldest call leaves the window after this long.
                WINDOW - now.duration_since(*calls.front().unwrap())
            };
            tracing::debug!("rate limit reached, waiting {:?}", wait);
            sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn allows_up_to_limit_without_waiting() {
        let limiter = RateLimiter::new(3);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn fourth_call_waits_for_window() {
        let limiter = RateLimiter::new(3);
        for _ in 0..3 {
            limiter.acquire().await;
        }
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn no_window_ever_exceeds_limit() {
        let limiter = RateLimiter::new(2);
        let mut stamps = Vec::new();
        for i in 0..6 {
            limiter.acquire().await;
            stamps.push(Instant::now());
            // Uneven spacing between requests.
            tokio::time::advance(Duration::from_secs(7 * (i % 3))).await;
        }
        for (i, t) in stamps.iter().enumerate() {
            let in_window = stamps[..=i]
                .iter()
                .filter(|s| t.duration_since(**s) < Duration::from_secs(60))
                .count();
            assert!(in_window <= 2, "window ending at call {i} holds {in_window}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slot_frees_after_oldest_expires() {
        let limiter = RateLimiter::new(1);
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(61)).await;
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
