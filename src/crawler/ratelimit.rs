use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::trace;

/// Per-domain visit state
struct DomainState {
    last_visit: Option<Instant>,
}

/// Per-domain minimum-interval enforcement.
///
/// Each domain gets an independently locked state entry, so blocking on one
/// domain never delays workers operating on other domains. The map-level
/// lock is held only long enough to create or clone the entry; the wait
/// itself holds the per-domain lock, which also serializes same-domain
/// callers.
pub struct DomainRateLimiter {
    domains: Mutex<HashMap<String, Arc<Mutex<DomainState>>>>,
}

impl DomainRateLimiter {
    pub fn new() -> Self {
        Self {
            domains: Mutex::new(HashMap::new()),
        }
    }

    /// Block until a request to `domain` is allowed under `rate` requests
    /// per second, then record the visit. A non-positive rate disables
    /// limiting.
    pub async fn wait(&self, domain: &str, rate: f64) {
        if rate <= 0.0 {
            return;
        }

        let entry = {
            let mut domains = self.domains.lock().await;
            domains
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(DomainState { last_visit: None })))
                .clone()
        };

        let min_interval = Duration::from_secs_f64(1.0 / rate);

        let mut state = entry.lock().await;
        if let Some(last) = state.last_visit {
            let elapsed = last.elapsed();
            if elapsed < min_interval {
                let remaining = min_interval - elapsed;
                trace!("Rate limiting {} for {:?}", domain, remaining);
                sleep(remaining).await;
            }
        }
        state.last_visit = Some(Instant::now());
    }

    /// Number of domains with recorded state
    pub async fn domain_count(&self) -> usize {
        self.domains.lock().await.len()
    }
}

impl Default for DomainRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant as StdInstant;

    #[tokio::test]
    async fn test_second_call_blocks_for_min_interval() {
        let limiter = DomainRateLimiter::new();

        limiter.wait("a.com", 2.0).await;
        let start = StdInstant::now();
        limiter.wait("a.com", 2.0).await;

        // 2 req/s => 500ms minimum interval
        assert!(start.elapsed() >= Duration::from_millis(490));
    }

    #[tokio::test]
    async fn test_other_domains_are_not_delayed() {
        let limiter = Arc::new(DomainRateLimiter::new());

        limiter.wait("a.com", 1.0).await;

        // While a.com is throttled for a full second, b.com must pass
        // immediately
        let start = StdInstant::now();
        limiter.wait("b.com", 1.0).await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_zero_rate_never_blocks() {
        let limiter = DomainRateLimiter::new();

        let start = StdInstant::now();
        limiter.wait("a.com", 0.0).await;
        limiter.wait("a.com", 0.0).await;
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(limiter.domain_count().await, 0);
    }
}
