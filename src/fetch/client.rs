use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::crawler::task::FetchResult;
use crate::error::CrawlError;
use crate::fetch::middleware::CrawlRequest;

/// Single-page HTTP retrieval. Issues one GET with merged custom headers and
/// returns a [`FetchResult`] or a transport error. No retry logic lives
/// here; retries are an orchestration-level decision.
pub struct Fetcher {
    client: Client,

    /// Client routed through the configured proxy, built once at
    /// construction and selected when a request carries a proxy target
    proxy_client: Option<Client>,
}

impl Fetcher {
    pub fn new(timeout: Duration, proxy_url: Option<&str>) -> Result<Self, CrawlError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CrawlError::InvalidConfig(format!("http client: {}", e)))?;

        let proxy_client = match proxy_url {
            Some(proxy_url) => {
                let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
                    CrawlError::InvalidConfig(format!("invalid proxy URL {}: {}", proxy_url, e))
                })?;
                Some(
                    Client::builder()
                        .timeout(timeout)
                        .proxy(proxy)
                        .build()
                        .map_err(|e| {
                            CrawlError::InvalidConfig(format!("proxy client: {}", e))
                        })?,
                )
            }
            None => None,
        };

        Ok(Self {
            client,
            proxy_client,
        })
    }

    /// Fetch one page. Uses the proxied client when the request was rewritten
    /// by the proxy middleware.
    pub async fn fetch(&self, request: &CrawlRequest) -> Result<FetchResult, CrawlError> {
        let url = request.url.to_string();

        let client = if request.proxy.is_some() {
            self.proxy_client.as_ref().unwrap_or(&self.client)
        } else {
            &self.client
        };

        let mut builder = client.get(request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        debug!("Fetching: {}", url);
        let response = builder.send().await.map_err(|e| CrawlError::Transport {
            url: url.clone(),
            source: e,
        })?;

        let status_code = response.status().as_u16();

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.to_string(), value.to_string());
            }
        }

        let content_type = headers
            .get("content-type")
            .cloned()
            .unwrap_or_default();

        let body = response.text().await.map_err(|e| CrawlError::Transport {
            url: url.clone(),
            source: e,
        })?;

        Ok(FetchResult {
            url,
            body,
            headers,
            status_code,
            content_type,
        })
    }
}
