use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use std::fs;
use tracing::debug;

use crate::error::CrawlError;
use crate::crawler::task::CrawlResult;
use crate::fetch::middleware::Middleware;
use crate::filter::{ResultFilter, UrlFilter};

/// Frontier ordering strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerType {
    /// Priority descending, FIFO among equal priorities
    #[default]
    Priority,
    /// Pure insertion order
    Fifo,
}

/// Scalar crawl settings, immutable for the duration of a session.
///
/// Loadable from a YAML file; the non-serializable parts of the
/// configuration (filters, middleware, callbacks) live on [`CrawlerOptions`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSettings {
    /// Number of concurrent workers
    pub worker_count: usize,

    /// Initial capacity reserved for the frontier; not a hard bound
    pub queue_size: usize,

    /// Requests per second per domain (<= 0 disables rate limiting)
    pub rate_limit: f64,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,

    /// Whether the robots.txt middleware is installed
    pub respect_robots_txt: bool,

    /// Maximum crawl depth (0 = unlimited)
    pub max_depth: u32,

    /// Extra headers merged into every request
    pub headers: HashMap<String, String>,

    /// User agent sent with every request
    pub user_agent: String,

    /// Outgoing proxy target, e.g. "http://proxy:8080" or "socks5://..."
    pub proxy_url: Option<String>,

    /// Whether discovered links may leave the parent page's domain
    pub allow_external_domains: bool,

    /// Render pages in a headless browser instead of plain fetching
    pub render_javascript: bool,

    /// Per-render timeout in milliseconds, distinct from the fetch timeout
    pub render_timeout_ms: u64,

    /// Wait for document.readyState == "complete" before extracting
    pub render_wait_ready: bool,

    /// Scroll to the bottom of the page to surface infinite-scroll content
    pub render_scroll: bool,

    /// WebDriver endpoint for the renderer
    pub webdriver_url: String,

    /// Maximum re-enqueues for responses classified retryable
    pub max_retries: u32,

    /// Delay before a retry re-enters the frontier, in milliseconds
    pub retry_interval_ms: u64,

    /// Priority assigned to seeds and discovered links
    pub default_priority: i32,

    /// Frontier ordering strategy
    pub scheduler_type: SchedulerType,

    /// Upper bound on a worker's wait for the next task, in milliseconds
    pub queue_timeout_ms: u64,

    /// Record per-status/error-type/resource-type breakdowns
    pub enable_metrics: bool,

    /// Port for the embedding application's metrics endpoint
    pub metrics_port: u16,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_size: 256,
            rate_limit: 2.0,
            timeout_ms: 15_000,
            respect_robots_txt: true,
            max_depth: 3,
            headers: HashMap::new(),
            user_agent: "crawler-core/0.1 (+https://github.com/crawler-core)".to_string(),
            proxy_url: None,
            allow_external_domains: false,
            render_javascript: false,
            render_timeout_ms: 30_000,
            render_wait_ready: true,
            render_scroll: false,
            webdriver_url: "http://localhost:4444".to_string(),
            max_retries: 2,
            retry_interval_ms: 1_000,
            default_priority: 0,
            scheduler_type: SchedulerType::Priority,
            queue_timeout_ms: 500,
            enable_metrics: true,
            metrics_port: 9100,
        }
    }
}

impl CrawlSettings {
    /// Load settings from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading crawl settings from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read settings file: {}", path.display()))?;

        let settings: Self = serde_yaml::from_str(&contents)
            .context(format!("Failed to parse settings file: {}", path.display()))?;

        Ok(settings)
    }

    /// Save settings to a YAML file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory: {}", parent.display()))?;
        }

        let contents = serde_yaml::to_string(self).context("Failed to serialize settings")?;
        fs::write(path, contents)
            .context(format!("Failed to write settings file: {}", path.display()))?;

        Ok(())
    }

    /// Surface malformed configuration before a session starts
    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.worker_count == 0 {
            return Err(CrawlError::InvalidConfig(
                "worker_count must be greater than 0".to_string(),
            ));
        }
        if self.queue_size == 0 {
            return Err(CrawlError::InvalidConfig(
                "queue_size must be greater than 0".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(CrawlError::InvalidConfig(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.user_agent.is_empty() {
            return Err(CrawlError::InvalidConfig(
                "user_agent must not be empty".to_string(),
            ));
        }
        if self.render_javascript && self.render_timeout_ms == 0 {
            return Err(CrawlError::InvalidConfig(
                "render_timeout_ms must be greater than 0 when rendering".to_string(),
            ));
        }
        if self.render_javascript && self.webdriver_url.is_empty() {
            return Err(CrawlError::InvalidConfig(
                "webdriver_url must not be empty when rendering".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }
}

/// Callback invoked for every classified error
pub type ErrorCallback = Arc<dyn Fn(&CrawlError) + Send + Sync>;

/// Callback invoked for every result handed to the sink
pub type ResultCallback = Arc<dyn Fn(&CrawlResult) + Send + Sync>;

/// Full crawl configuration: scalar settings plus the pluggable pieces
#[derive(Clone, Default)]
pub struct CrawlerOptions {
    pub settings: CrawlSettings,

    /// Accept/reject predicates applied to discovered URLs before enqueue
    pub url_filters: Vec<Arc<dyn UrlFilter>>,

    /// Accept/reject predicates applied to parsed results
    pub result_filters: Vec<Arc<dyn ResultFilter>>,

    /// Additional middleware appended after the built-in chain
    pub middlewares: Vec<Arc<dyn Middleware>>,

    pub error_callback: Option<ErrorCallback>,
    pub result_callback: Option<ResultCallback>,
}

impl CrawlerOptions {
    pub fn new(settings: CrawlSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn with_url_filter(mut self, filter: Arc<dyn UrlFilter>) -> Self {
        self.url_filters.push(filter);
        self
    }

    pub fn with_result_filter(mut self, filter: Arc<dyn ResultFilter>) -> Self {
        self.result_filters.push(filter);
        self
    }

    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn on_error(mut self, callback: ErrorCallback) -> Self {
        self.error_callback = Some(callback);
        self
    }

    pub fn on_result(mut self, callback: ResultCallback) -> Self {
        self.result_callback = Some(callback);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(CrawlSettings::default().validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let settings = CrawlSettings {
            worker_count: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(CrawlError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_render_requires_webdriver_url() {
        let settings = CrawlSettings {
            render_javascript: true,
            webdriver_url: String::new(),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_settings_yaml_round_trip() {
        let settings = CrawlSettings {
            worker_count: 8,
            scheduler_type: SchedulerType::Fifo,
            ..Default::default()
        };

        let yaml = serde_yaml::to_string(&settings).unwrap();
        let back: CrawlSettings = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.worker_count, 8);
        assert_eq!(back.scheduler_type, SchedulerType::Fifo);
    }
}
