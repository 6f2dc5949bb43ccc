use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Instant;
use chrono::Utc;
use futures::future::join_all;
use rand::Rng;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::{CrawlSettings, CrawlerOptions, ErrorCallback, ResultCallback};
use crate::crawler::dedup::VisitedSet;
use crate::crawler::depth::DepthTracker;
use crate::crawler::frontier::Frontier;
use crate::crawler::ratelimit::DomainRateLimiter;
use crate::crawler::stats::{CrawlStats, StatsCollector};
use crate::crawler::task::{CrawlResult, CrawlTask, FetchResult, ParseResult};
use crate::error::CrawlError;
use crate::fetch::client::Fetcher;
use crate::fetch::middleware::{
    CrawlRequest, Middleware, MiddlewareChain, ProxyMiddleware, RetryMiddleware,
    UserAgentMiddleware,
};
use crate::fetch::render::{BrowserRenderer, PageRenderer};
use crate::fetch::robots::RobotsMiddleware;
use crate::filter::{ResultFilter, UrlFilter};
use crate::parse::extractor::PageParser;
use crate::storage::Storage;

/// Session lifecycle states
const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_DRAINING: u8 = 2;
const STATE_STOPPED: u8 = 3;

/// Maximum random jitter added to the retry interval
const RETRY_JITTER_MS: u64 = 250;

/// Everything a worker needs for the fetch/parse pipeline, shared by all
/// workers of one session
struct CrawlContext {
    settings: CrawlSettings,
    url_filters: Vec<Arc<dyn UrlFilter>>,
    result_filters: Vec<Arc<dyn ResultFilter>>,
    error_callback: Option<ErrorCallback>,
    result_callback: Option<ResultCallback>,

    frontier: Frontier,
    visited: VisitedSet,
    depths: DepthTracker,
    limiter: DomainRateLimiter,
    stats: StatsCollector,
    chain: MiddlewareChain,

    /// The installed retry classifier; carries the attempt budget and the
    /// re-enqueue spacing consulted by [`CrawlContext::handle_retryable`]
    retry: Arc<RetryMiddleware>,
    fetcher: Fetcher,
    renderer: Option<Arc<dyn PageRenderer>>,
    parser: PageParser,
    storage: Arc<dyn Storage>,

    /// Tasks enqueued but not yet fully processed; 0 means the session is
    /// idle
    pending: AtomicUsize,
    idle: Notify,
    cancel: CancellationToken,
}

impl CrawlContext {
    fn report_error(&self, err: &CrawlError) {
        self.stats.record_error(err.error_type(), err.counts_as_failure());
        if let Some(callback) = &self.error_callback {
            callback(err);
        }
    }

    fn task_done(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Push a task, accounting for it in the pending counter. Returns false
    /// when the frontier already closed.
    fn enqueue(&self, task: CrawlTask) -> bool {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.frontier.push(task) {
            true
        } else {
            self.task_done();
            false
        }
    }

    /// Gate a discovered link through filters, domain policy, depth and
    /// dedup, then enqueue it
    fn enqueue_discovered(&self, parent: &CrawlTask, link: &str) {
        let parsed = match Url::parse(link) {
            Ok(url) => url,
            Err(_) => return,
        };

        if !self.url_filters.iter().all(|filter| filter.accept(&parsed)) {
            debug!("Filter rejected discovered URL: {}", link);
            return;
        }

        if !self.settings.allow_external_domains {
            let parent_host = Url::parse(&parent.url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_lowercase));
            let link_host = parsed.host_str().map(str::to_lowercase);
            if parent_host != link_host {
                debug!("Skipping external URL: {}", link);
                return;
            }
        }

        self.depths.set_depth(link, parent.depth + 1);
        if self.depths.is_exceeded(link, self.settings.max_depth) {
            debug!("Depth limit reached, skipping: {}", link);
            return;
        }

        if !self.visited.check_and_mark(link) {
            return;
        }

        let task = CrawlTask::discovered(
            link.to_string(),
            self.settings.default_priority,
            parent,
        );
        self.enqueue(task);
    }

    /// Run one task through the full pipeline. Per-task failures never
    /// escape; they are classified, recorded and reported.
    async fn process(self: Arc<Self>, task: CrawlTask) {
        let processing_started = Instant::now();

        let url = match Url::parse(&task.url) {
            Ok(url) => url,
            Err(e) => {
                warn!("Dropping unparseable task URL {}: {}", task.url, e);
                self.task_done();
                return;
            }
        };

        let domain = url.host_str().unwrap_or_default().to_string();
        self.limiter.wait(&domain, self.settings.rate_limit).await;

        let mut request = CrawlRequest::new(url);
        for (name, value) in &self.settings.headers {
            request.headers.insert(name.clone(), value.clone());
        }

        if let Err(e) = self.chain.process_request(&mut request).await {
            self.report_error(&e);
            self.task_done();
            return;
        }

        let download_started = Instant::now();
        let fetched = self.download(&request, &task).await;
        let download_time = download_started.elapsed();

        let mut response = match fetched {
            Ok(response) => response,
            Err(e) => {
                self.report_error(&e);
                self.task_done();
                return;
            }
        };

        if let Err(e) = self.chain.process_response(&mut response).await {
            match &e {
                CrawlError::Retryable { url, status } => {
                    self.handle_retryable(&task, url, *status);
                }
                _ => {
                    self.report_error(&e);
                    self.task_done();
                }
            }
            return;
        }

        let parsed = self.parse_response(&task, &response);

        let mut result = CrawlResult {
            url: task.url.clone(),
            status_code: response.status_code,
            content_type: response.content_type.clone(),
            content_length: response.body.len(),
            parsed: None,
            error: None,
            depth: task.depth,
            parent_url: task.parent_url.clone(),
            download_time,
            processing_time: processing_started.elapsed(),
            crawled_at: Utc::now(),
        };

        self.stats.record_page(response.status_code);

        if let Some(parsed) = parsed {
            if !self
                .result_filters
                .iter()
                .all(|filter| filter.accept(&parsed))
            {
                debug!("Result filter rejected {}", task.url);
                self.report_error(&CrawlError::Policy {
                    url: task.url.clone(),
                    reason: "rejected by result filter".to_string(),
                });
                self.task_done();
                return;
            }

            self.stats.record_resources(&parsed.resources);

            for link in &parsed.links {
                self.enqueue_discovered(&task, link);
            }

            result.parsed = Some(parsed);
        }

        result.processing_time = processing_started.elapsed();

        if let Err(e) = self.storage.store(result.clone()).await {
            warn!("Result sink rejected {}: {}", result.url, e);
        }
        if let Some(callback) = &self.result_callback {
            callback(&result);
        }

        self.task_done();
    }

    /// Plain fetch, or headless render when configured
    async fn download(
        &self,
        request: &CrawlRequest,
        task: &CrawlTask,
    ) -> Result<FetchResult, CrawlError> {
        match &self.renderer {
            Some(renderer) => {
                let body = renderer.render(request.url.as_str()).await?;
                Ok(FetchResult {
                    url: task.url.clone(),
                    body,
                    headers: Default::default(),
                    status_code: 200,
                    content_type: "text/html".to_string(),
                })
            }
            None => self.fetcher.fetch(request).await,
        }
    }

    fn parse_response(&self, task: &CrawlTask, response: &FetchResult) -> Option<ParseResult> {
        if !response.content_type.contains("text/html") && !response.content_type.is_empty() {
            return None;
        }

        match self.parser.parse(&task.url, &response.body) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                self.report_error(&e);
                None
            }
        }
    }

    /// Re-enqueue a task classified retryable, spaced by the retry interval
    /// plus jitter, until its attempt budget runs out
    fn handle_retryable(self: Arc<Self>, task: &CrawlTask, url: &str, status: u16) {
        if task.attempt >= self.retry.max_retries() {
            debug!(
                "Retry budget exhausted for {} after {} attempts",
                url,
                task.attempt + 1
            );
            self.report_error(&CrawlError::Retryable {
                url: url.to_string(),
                status,
            });
            self.task_done();
            return;
        }

        let retry = task.retry();
        let delay = self.retry.retry_interval()
            + std::time::Duration::from_millis(rand::thread_rng().gen_range(0..=RETRY_JITTER_MS));
        debug!(
            "Scheduling retry {}/{} for {} in {:?}",
            retry.attempt,
            self.retry.max_retries(),
            url,
            delay
        );

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The original task still counts as pending; only hand it over
            if !self.frontier.push(retry) {
                self.task_done();
            }
        });
    }
}

/// Worker pool and session orchestrator.
///
/// Owns the lifecycle state machine (`Idle → Running → Draining → Stopped`),
/// the frontier and the shared pipeline components. Results go to the
/// injected [`Storage`] sink; the engine never talks to a database directly.
pub struct Crawler {
    session_id: Uuid,
    options: StdMutex<CrawlerOptions>,
    storage: Arc<dyn Storage>,
    state: AtomicU8,
    ctx: StdMutex<Option<Arc<CrawlContext>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Crawler {
    /// Validate configuration and build a crawler bound to a result sink.
    /// Malformed configuration surfaces here, never silently.
    pub fn new(options: CrawlerOptions, storage: Arc<dyn Storage>) -> Result<Self, CrawlError> {
        options.settings.validate()?;

        Ok(Self {
            session_id: Uuid::new_v4(),
            options: StdMutex::new(options),
            storage,
            state: AtomicU8::new(STATE_IDLE),
            ctx: StdMutex::new(None),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Replace the active configuration. Session-scoped: refused once the
    /// crawl is running.
    pub fn set_options(&self, options: CrawlerOptions) -> Result<(), CrawlError> {
        if self.state.load(Ordering::Acquire) != STATE_IDLE {
            return Err(CrawlError::AlreadyRunning);
        }
        options.settings.validate()?;
        *self.options.lock().expect("options lock poisoned") = options;
        Ok(())
    }

    /// Begin crawling with an internally managed cancellation signal
    pub async fn start(&self) -> Result<(), CrawlError> {
        self.start_with_cancellation(CancellationToken::new()).await
    }

    /// Begin crawling. Errors with [`CrawlError::AlreadyRunning`] unless the
    /// session is Idle. Workers observe `cancel` at every blocking point.
    pub async fn start_with_cancellation(
        &self,
        cancel: CancellationToken,
    ) -> Result<(), CrawlError> {
        if self
            .state
            .compare_exchange(
                STATE_IDLE,
                STATE_RUNNING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(CrawlError::AlreadyRunning);
        }

        let options = self.options.lock().expect("options lock poisoned").clone();
        let settings = options.settings.clone();

        let ctx = match self.build_context(options, cancel).await {
            Ok(ctx) => Arc::new(ctx),
            Err(e) => {
                // Construction failures leave the crawler startable again
                self.state.store(STATE_IDLE, Ordering::Release);
                return Err(e);
            }
        };

        *self.ctx.lock().expect("context lock poisoned") = Some(ctx.clone());

        info!(
            session = %self.session_id,
            workers = settings.worker_count,
            "Starting crawl session"
        );

        let mut workers = self.workers.lock().await;
        for worker_id in 0..settings.worker_count {
            let ctx = ctx.clone();
            let session = self.session_id;
            workers.push(tokio::spawn(async move {
                debug!(session = %session, worker = worker_id, "Worker started");
                Self::worker_loop(ctx).await;
                debug!(session = %session, worker = worker_id, "Worker exited");
            }));
        }

        Ok(())
    }

    async fn build_context(
        &self,
        options: CrawlerOptions,
        cancel: CancellationToken,
    ) -> Result<CrawlContext, CrawlError> {
        let settings = options.settings;

        let retry = Arc::new(RetryMiddleware::new(
            settings.max_retries,
            settings.retry_interval(),
        ));

        let mut middlewares: Vec<Arc<dyn Middleware>> = Vec::new();
        middlewares.push(Arc::new(UserAgentMiddleware::new(
            settings.user_agent.clone(),
        )));
        middlewares.push(retry.clone());
        if settings.respect_robots_txt {
            middlewares.push(Arc::new(RobotsMiddleware::new(
                settings.user_agent.clone(),
                settings.timeout(),
            )?));
        }
        if let Some(proxy_url) = &settings.proxy_url {
            middlewares.push(Arc::new(ProxyMiddleware::new(proxy_url.clone())));
        }
        middlewares.extend(options.middlewares);

        let fetcher = Fetcher::new(settings.timeout(), settings.proxy_url.as_deref())?;

        let renderer: Option<Arc<dyn PageRenderer>> = if settings.render_javascript {
            let renderer = BrowserRenderer::new(
                &settings.webdriver_url,
                &settings.user_agent,
                settings.render_timeout(),
                settings.render_wait_ready,
                settings.render_scroll,
            )
            .await?;
            Some(Arc::new(renderer))
        } else {
            None
        };

        Ok(CrawlContext {
            frontier: Frontier::new(settings.scheduler_type, settings.queue_size),
            visited: VisitedSet::new(),
            depths: DepthTracker::new(),
            limiter: DomainRateLimiter::new(),
            stats: StatsCollector::new(settings.enable_metrics),
            chain: MiddlewareChain::new(middlewares),
            retry,
            fetcher,
            renderer,
            parser: PageParser::new(),
            storage: self.storage.clone(),
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
            cancel,
            url_filters: options.url_filters,
            result_filters: options.result_filters,
            error_callback: options.error_callback,
            result_callback: options.result_callback,
            settings,
        })
    }

    /// Worker body: wait for a task or cancellation, run the pipeline, loop
    async fn worker_loop(ctx: Arc<CrawlContext>) {
        let queue_timeout = ctx.settings.queue_timeout();

        loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                next = timeout(queue_timeout, ctx.frontier.next()) => {
                    match next {
                        Ok(Some(task)) => ctx.clone().process(task).await,
                        // Frontier closed and drained
                        Ok(None) => break,
                        // Quiet frontier: loop to re-observe cancellation
                        Err(_) => continue,
                    }
                }
            }
        }
    }

    /// Enqueue a seed or discovered URL. Accepted only while Running;
    /// otherwise a silent no-op (never panics).
    pub fn add_url(&self, url: &str) {
        if self.state.load(Ordering::Acquire) != STATE_RUNNING {
            debug!("add_url ignored, crawler not running: {}", url);
            return;
        }

        let ctx = match self.ctx.lock().expect("context lock poisoned").clone() {
            Some(ctx) => ctx,
            None => return,
        };

        if Url::parse(url).is_err() {
            warn!("Ignoring invalid URL: {}", url);
            return;
        }

        if !ctx.visited.check_and_mark(url) {
            debug!("Skipping already seen URL: {}", url);
            return;
        }
        ctx.depths.set_depth(url, 0);

        let task = CrawlTask::seed(url.to_string(), ctx.settings.default_priority);
        ctx.enqueue(task);
    }

    /// Request graceful shutdown: cancel workers, close the frontier exactly
    /// once, join the pool and release the renderer. Idempotent.
    pub async fn stop(&self) {
        let transitioned = self
            .state
            .compare_exchange(
                STATE_RUNNING,
                STATE_DRAINING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !transitioned {
            debug!("stop ignored, crawler not running");
            return;
        }

        let ctx = self.ctx.lock().expect("context lock poisoned").clone();

        if let Some(ctx) = &ctx {
            ctx.cancel.cancel();
            // close() is guarded internally; a racing natural completion
            // cannot close twice
            ctx.frontier.close();
        }

        let workers: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for result in join_all(workers).await {
            if let Err(e) = result {
                error!("Worker panicked during shutdown: {}", e);
            }
        }

        if let Some(ctx) = &ctx {
            if let Some(renderer) = &ctx.renderer {
                renderer.close().await;
            }
        }

        self.state.store(STATE_STOPPED, Ordering::Release);
        info!(session = %self.session_id, "Crawl session stopped");
    }

    /// Resolve once every enqueued task has been fully processed. Useful for
    /// crawl-to-completion embedders; combine with [`Crawler::stop`].
    pub async fn wait_until_idle(&self) {
        let ctx = match self.ctx.lock().expect("context lock poisoned").clone() {
            Some(ctx) => ctx,
            None => return,
        };

        loop {
            let notified = ctx.idle.notified();
            if ctx.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Point-in-time statistics snapshot, polled by dashboards
    pub fn stats(&self) -> CrawlStats {
        match self.ctx.lock().expect("context lock poisoned").as_ref() {
            Some(ctx) => ctx.stats.snapshot(),
            None => CrawlStats::default(),
        }
    }

    /// Number of tasks waiting in the frontier
    pub fn queued_tasks(&self) -> usize {
        match self.ctx.lock().expect("context lock poisoned").as_ref() {
            Some(ctx) => ctx.frontier.len(),
            None => 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_RUNNING
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn options() -> CrawlerOptions {
        let mut options = CrawlerOptions::default();
        options.settings.respect_robots_txt = false;
        options.settings.rate_limit = 0.0;
        options.settings.worker_count = 2;
        options
    }

    #[tokio::test]
    async fn test_double_start_is_refused() {
        let crawler = Crawler::new(options(), Arc::new(MemoryStorage::new())).unwrap();

        crawler.start().await.unwrap();
        let err = crawler.start().await.unwrap_err();
        assert!(matches!(err, CrawlError::AlreadyRunning));

        crawler.stop().await;
    }

    #[tokio::test]
    async fn test_add_url_before_start_is_noop() {
        let crawler = Crawler::new(options(), Arc::new(MemoryStorage::new())).unwrap();

        crawler.add_url("https://example.com");
        assert_eq!(crawler.queued_tasks(), 0);
    }

    #[tokio::test]
    async fn test_add_url_after_stop_is_noop() {
        let crawler = Crawler::new(options(), Arc::new(MemoryStorage::new())).unwrap();

        crawler.start().await.unwrap();
        crawler.stop().await;

        crawler.add_url("https://example.com/after-stop");
        assert_eq!(crawler.queued_tasks(), 0);
        assert!(!crawler.is_running());
    }

    #[tokio::test]
    async fn test_set_options_refused_while_running() {
        let crawler = Crawler::new(options(), Arc::new(MemoryStorage::new())).unwrap();

        crawler.start().await.unwrap();
        assert!(matches!(
            crawler.set_options(options()),
            Err(CrawlError::AlreadyRunning)
        ));
        crawler.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_options_rejected_at_construction() {
        let mut bad = options();
        bad.settings.worker_count = 0;
        assert!(matches!(
            Crawler::new(bad, Arc::new(MemoryStorage::new())),
            Err(CrawlError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let crawler = Crawler::new(options(), Arc::new(MemoryStorage::new())).unwrap();

        crawler.start().await.unwrap();
        crawler.stop().await;
        crawler.stop().await;
        assert!(!crawler.is_running());
    }
}
