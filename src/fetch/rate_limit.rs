//! Per-domain minimum-interval rate limiter

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

/// Throttles requests so that at most `rate_per_second` requests per second
/// are issued to any single domain.
///
/// Each domain gets its own lock and last-grant timestamp, created lazily.
/// Concurrent callers for the same domain serialize on the domain lock (the
/// lock is held across the pacing sleep); callers for different domains do
/// not contend. A rate of 0 disables throttling entirely.
pub struct RateLimiter {
    min_interval: Duration,
    domains: Mutex<HashMap<String, Arc<Mutex<Option<Instant>>>>>,
}

impl RateLimiter {
    pub fn new(rate_per_second: f64) -> Self {
        let min_interval = if rate_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / rate_per_second)
        } else {
            Duration::ZERO
        };
        Self {
            min_interval,
            domains: Mutex::new(HashMap::new()),
        }
    }

    /// Suspends the caller until the domain of `url` may be hit again.
    ///
    /// Never errors: unparseable URLs fall into a shared bucket keyed by the
    /// raw string, which still paces them.
    pub async fn acquire(&self, url: &str) {
        if self.min_interval.is_zero() {
            return;
        }

        let key = domain_key(url);
        let slot = {
            let mut domains = self.domains.lock().await;
            domains.entry(key).or_default().clone()
        };

        let mut last = slot.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Rate-limit key for a URL: `scheme://host[:port]`.
fn domain_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or("");
            match parsed.port() {
                Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
                None => format!("{}://{}", parsed.scheme(), host),
            }
        }
        Err(_) => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_key_strips_path() {
        assert_eq!(
            domain_key("https://bo.example.com/digi/com/cto/view?nr=1"),
            "https://bo.example.com"
        );
    }

    #[test]
    fn test_domain_key_keeps_port() {
        assert_eq!(
            domain_key("http://127.0.0.1:8080/page"),
            "http://127.0.0.1:8080"
        );
    }

    #[tokio::test]
    async fn test_zero_rate_never_waits() {
        let limiter = RateLimiter::new(0.0);
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire("https://bo.example.com/x").await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_spacing_enforced_per_domain() {
        let limiter = RateLimiter::new(20.0); // 50ms interval
        let start = Instant::now();
        limiter.acquire("https://a.example.com/1").await;
        limiter.acquire("https://a.example.com/2").await;
        limiter.acquire("https://a.example.com/3").await;
        // Two spacing gaps of 50ms each.
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_independent_domains_do_not_wait_on_each_other() {
        let limiter = RateLimiter::new(5.0); // 200ms interval
        limiter.acquire("https://a.example.com/").await;
        let start = Instant::now();
        limiter.acquire("https://b.example.com/").await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
