use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use tracing::debug;

use crate::crawler::task::FetchResult;
use crate::error::CrawlError;

/// Outgoing request as seen by the middleware chain, before the fetcher
/// turns it into an HTTP call
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub url: Url,

    /// Headers merged into the request
    pub headers: HashMap<String, String>,

    /// Transport target override set by the proxy middleware
    pub proxy: Option<String>,
}

impl CrawlRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: HashMap::new(),
            proxy: None,
        }
    }
}

/// Ordered request/response interceptor.
///
/// A request-phase error aborts the fetch for that task. A response-phase
/// error classifies the outcome (e.g. retryable) but performs no retry
/// itself; the orchestrator owns that decision.
#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process_request(&self, request: &mut CrawlRequest) -> Result<(), CrawlError>;

    async fn process_response(&self, _response: &mut FetchResult) -> Result<(), CrawlError> {
        Ok(())
    }
}

/// Ordered list of interceptors applied around each fetch
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middlewares }
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Run the request phase in order; the first error aborts
    pub async fn process_request(&self, request: &mut CrawlRequest) -> Result<(), CrawlError> {
        for middleware in &self.middlewares {
            if let Err(e) = middleware.process_request(request).await {
                debug!(
                    "Middleware '{}' rejected request for {}: {}",
                    middleware.name(),
                    request.url,
                    e
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Run the response phase in order; the first error classifies the task
    pub async fn process_response(&self, response: &mut FetchResult) -> Result<(), CrawlError> {
        for middleware in &self.middlewares {
            middleware.process_response(response).await?;
        }
        Ok(())
    }
}

/// Sets a fixed User-Agent header; no response handling
pub struct UserAgentMiddleware {
    user_agent: String,
}

impl UserAgentMiddleware {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl Middleware for UserAgentMiddleware {
    fn name(&self) -> &'static str {
        "user-agent"
    }

    async fn process_request(&self, request: &mut CrawlRequest) -> Result<(), CrawlError> {
        request
            .headers
            .insert("User-Agent".to_string(), self.user_agent.clone());
        Ok(())
    }
}

/// Classifies 5xx responses as retryable and carries the retry budget for
/// the orchestrator. Performs no retries itself.
pub struct RetryMiddleware {
    max_retries: u32,
    retry_interval: Duration,
}

impl RetryMiddleware {
    pub fn new(max_retries: u32, retry_interval: Duration) -> Self {
        Self {
            max_retries,
            retry_interval,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    fn name(&self) -> &'static str {
        "retry-classifier"
    }

    async fn process_request(&self, _request: &mut CrawlRequest) -> Result<(), CrawlError> {
        Ok(())
    }

    async fn process_response(&self, response: &mut FetchResult) -> Result<(), CrawlError> {
        if response.status_code >= 500 {
            return Err(CrawlError::Retryable {
                url: response.url.clone(),
                status: response.status_code,
            });
        }
        Ok(())
    }
}

/// Rewrites the outgoing transport target
pub struct ProxyMiddleware {
    proxy_url: String,
}

impl ProxyMiddleware {
    pub fn new(proxy_url: impl Into<String>) -> Self {
        Self {
            proxy_url: proxy_url.into(),
        }
    }
}

#[async_trait]
impl Middleware for ProxyMiddleware {
    fn name(&self) -> &'static str {
        "proxy"
    }

    async fn process_request(&self, request: &mut CrawlRequest) -> Result<(), CrawlError> {
        request.proxy = Some(self.proxy_url.clone());
        Ok(())
    }
}
