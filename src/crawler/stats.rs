use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use serde::Serialize;

/// Point-in-time snapshot of crawl statistics, polled by external dashboards
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlStats {
    /// Pages fetched and processed successfully
    pub pages_visited: usize,

    /// Transport, parse and exhausted-retry failures. Policy rejections are
    /// deliberately excluded.
    pub error_count: usize,

    /// Time since the collector was started
    #[serde(serialize_with = "serialize_duration_secs")]
    pub duration: Duration,

    /// Completed requests per second over the session so far
    pub requests_per_second: f64,

    /// HTTP status code counts
    pub status_codes: HashMap<u16, usize>,

    /// Classified error counts by type, including policy rejections
    pub error_types: HashMap<String, usize>,

    /// Discovered resource counts by kind (image/script/stylesheet)
    pub resource_types: HashMap<String, usize>,
}

fn serialize_duration_secs<S: serde::Serializer>(
    d: &Duration,
    s: S,
) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Statistics collector shared by all workers.
///
/// Counters are atomic and the breakdown maps sit behind their own mutex,
/// never a lock shared with network I/O.
pub struct StatsCollector {
    pages_visited: AtomicUsize,
    error_count: AtomicUsize,
    started: Instant,

    /// When false, only the counters above are maintained
    detailed: bool,

    status_codes: Mutex<HashMap<u16, usize>>,
    error_types: Mutex<HashMap<String, usize>>,
    resource_types: Mutex<HashMap<String, usize>>,
}

impl StatsCollector {
    pub fn new(detailed: bool) -> Self {
        Self {
            pages_visited: AtomicUsize::new(0),
            error_count: AtomicUsize::new(0),
            started: Instant::now(),
            detailed,
            status_codes: Mutex::new(HashMap::new()),
            error_types: Mutex::new(HashMap::new()),
            resource_types: Mutex::new(HashMap::new()),
        }
    }

    /// Record a successfully processed page
    pub fn record_page(&self, status_code: u16) {
        self.pages_visited.fetch_add(1, Ordering::Relaxed);

        if self.detailed {
            let mut codes = self.status_codes.lock().expect("stats lock poisoned");
            *codes.entry(status_code).or_default() += 1;
        }
    }

    /// Record a classified error. `counts_as_failure` is false for policy
    /// rejections, which appear in the breakdown map but never in the
    /// retry-eligible error counter.
    pub fn record_error(&self, error_type: &str, counts_as_failure: bool) {
        if counts_as_failure {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }

        if self.detailed {
            let mut types = self.error_types.lock().expect("stats lock poisoned");
            *types.entry(error_type.to_string()).or_default() += 1;
        }
    }

    /// Record resources discovered on a page, grouped by kind
    pub fn record_resources(&self, resources: &HashMap<String, Vec<String>>) {
        if !self.detailed {
            return;
        }

        let mut kinds = self.resource_types.lock().expect("stats lock poisoned");
        for (kind, urls) in resources {
            *kinds.entry(kind.clone()).or_default() += urls.len();
        }
    }

    pub fn pages_visited(&self) -> usize {
        self.pages_visited.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> usize {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Build a snapshot with the derived rate
    pub fn snapshot(&self) -> CrawlStats {
        let duration = self.started.elapsed();
        let visited = self.pages_visited();
        let elapsed = duration.as_secs_f64();
        let requests_per_second = if elapsed > 0.0 {
            visited as f64 / elapsed
        } else {
            0.0
        };

        CrawlStats {
            pages_visited: visited,
            error_count: self.error_count(),
            duration,
            requests_per_second,
            status_codes: self.status_codes.lock().expect("stats lock poisoned").clone(),
            error_types: self.error_types.lock().expect("stats lock poisoned").clone(),
            resource_types: self
                .resource_types
                .lock()
                .expect("stats lock poisoned")
                .clone(),
        }
    }
}
