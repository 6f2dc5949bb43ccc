use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::error::CrawlError;
use crate::fetch::middleware::{CrawlRequest, Middleware};

/// Parsed crawler-exclusion rules for one domain
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    /// Disallowed path prefixes applying to our user agent
    disallow: Vec<String>,
}

impl RobotsPolicy {
    /// Parse a robots.txt body, collecting Disallow rules from the `*`
    /// group and from any group naming `user_agent`.
    pub fn parse(body: &str, user_agent: &str) -> Self {
        let agent_token = user_agent
            .split('/')
            .next()
            .unwrap_or(user_agent)
            .to_lowercase();

        let mut disallow = Vec::new();
        let mut group_applies = false;
        let mut in_agent_line_run = false;

        for line in body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_lowercase();
            let value = value.trim();

            match field.as_str() {
                "user-agent" => {
                    let named = value.to_lowercase();
                    let matches = named == "*" || agent_token.contains(&named);
                    if in_agent_line_run {
                        group_applies = group_applies || matches;
                    } else {
                        group_applies = matches;
                    }
                    in_agent_line_run = true;
                }
                "disallow" => {
                    in_agent_line_run = false;
                    if group_applies && !value.is_empty() {
                        disallow.push(value.to_string());
                    }
                }
                _ => {
                    in_agent_line_run = false;
                }
            }
        }

        Self { disallow }
    }

    /// Policy that allows everything (used when robots.txt cannot be
    /// fetched: deliberate fail-open)
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_allowed(&self, path: &str) -> bool {
        !self.disallow.iter().any(|prefix| path.starts_with(prefix))
    }
}

/// Middleware enforcing robots.txt.
///
/// On the first request to a domain the policy is fetched once and cached
/// for the rest of the session; concurrent first requests to the same domain
/// share that fetch, and requests for other domains are never blocked by it.
/// A failed robots fetch caches an allow-everything policy. Disallowed paths
/// abort the request with a policy error, which is distinct from a transport
/// error and excluded from the retry-eligible error rate.
pub struct RobotsMiddleware {
    client: Client,
    user_agent: String,
    cache: Mutex<HashMap<String, Arc<OnceCell<Arc<RobotsPolicy>>>>>,
}

impl RobotsMiddleware {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Result<Self, CrawlError> {
        let user_agent = user_agent.into();
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.clone())
            .build()
            .map_err(|e| CrawlError::InvalidConfig(format!("robots client: {}", e)))?;

        Ok(Self {
            client,
            user_agent,
            cache: Mutex::new(HashMap::new()),
        })
    }

    async fn policy_for(&self, request: &CrawlRequest) -> Arc<RobotsPolicy> {
        let origin = {
            let url = &request.url;
            let host = url.host_str().unwrap_or_default();
            match url.port() {
                Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
                None => format!("{}://{}", url.scheme(), host),
            }
        };

        // The map lock covers only entry creation. The fetch itself runs
        // under the per-domain cell, so a cache miss delays same-domain
        // callers only, never workers on other domains.
        let entry = {
            let mut cache = self.cache.lock().await;
            cache
                .entry(origin.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        entry
            .get_or_init(|| async { Arc::new(self.fetch_policy(&origin).await) })
            .await
            .clone()
    }

    async fn fetch_policy(&self, origin: &str) -> RobotsPolicy {
        let robots_url = format!("{}/robots.txt", origin);
        match self.client.get(&robots_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => {
                    debug!("Fetched robots.txt for {}", origin);
                    RobotsPolicy::parse(&body, &self.user_agent)
                }
                Err(e) => {
                    warn!("Failed to read robots.txt body for {}: {}", origin, e);
                    RobotsPolicy::allow_all()
                }
            },
            Ok(response) => {
                debug!(
                    "robots.txt for {} returned {}, allowing all",
                    origin,
                    response.status()
                );
                RobotsPolicy::allow_all()
            }
            Err(e) => {
                // Fail open: availability over strict compliance
                warn!("Failed to fetch robots.txt for {}: {}", origin, e);
                RobotsPolicy::allow_all()
            }
        }
    }
}

#[async_trait]
impl Middleware for RobotsMiddleware {
    fn name(&self) -> &'static str {
        "robots-txt"
    }

    async fn process_request(&self, request: &mut CrawlRequest) -> Result<(), CrawlError> {
        let policy = self.policy_for(request).await;

        if !policy.is_allowed(request.url.path()) {
            return Err(CrawlError::Policy {
                url: request.url.to_string(),
                reason: "disallowed by robots.txt".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn test_parse_wildcard_group() {
        let body = "User-agent: *\nDisallow: /private\nDisallow: /tmp\n";
        let policy = RobotsPolicy::parse(body, "crawler-core/0.1");

        assert!(!policy.is_allowed("/private"));
        assert!(!policy.is_allowed("/private/area"));
        assert!(!policy.is_allowed("/tmp"));
        assert!(policy.is_allowed("/public"));
    }

    #[test]
    fn test_parse_ignores_other_agents() {
        let body = "User-agent: othertbot\nDisallow: /blocked\n";
        let policy = RobotsPolicy::parse(body, "crawler-core/0.1");

        assert!(policy.is_allowed("/blocked"));
    }

    #[test]
    fn test_parse_named_agent_group() {
        let body = concat!(
            "User-agent: googlebot\n",
            "Disallow: /no-google\n",
            "\n",
            "User-agent: crawler-core\n",
            "Disallow: /no-us\n",
        );
        let policy = RobotsPolicy::parse(body, "crawler-core/0.1");

        assert!(policy.is_allowed("/no-google"));
        assert!(!policy.is_allowed("/no-us"));
    }

    #[test]
    fn test_empty_disallow_allows_everything() {
        let body = "User-agent: *\nDisallow:\n";
        let policy = RobotsPolicy::parse(body, "crawler-core/0.1");

        assert!(policy.is_allowed("/anything"));
    }

    #[tokio::test]
    async fn test_cached_domain_is_not_blocked_by_another_domains_fetch() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let slow = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("User-agent: *\nDisallow: /private\n")
                    .set_delay(Duration::from_millis(1500)),
            )
            .mount(&slow)
            .await;

        let fast = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\n"))
            .mount(&fast)
            .await;

        let middleware = Arc::new(
            RobotsMiddleware::new("crawler-core/0.1", Duration::from_secs(5)).unwrap(),
        );

        // Warm the cache for the fast domain
        let mut warm =
            CrawlRequest::new(Url::parse(&format!("{}/page", fast.uri())).unwrap());
        middleware.process_request(&mut warm).await.unwrap();

        // First-time check against the slow domain, still in flight below
        let in_flight = middleware.clone();
        let slow_url = format!("{}/page", slow.uri());
        let slow_check = tokio::spawn(async move {
            let mut request = CrawlRequest::new(Url::parse(&slow_url).unwrap());
            in_flight.process_request(&mut request).await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        // The cached domain must answer while the other fetch is pending
        let started = std::time::Instant::now();
        let mut cached =
            CrawlRequest::new(Url::parse(&format!("{}/other", fast.uri())).unwrap());
        middleware.process_request(&mut cached).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));

        slow_check.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_fail_open_when_robots_unreachable() {
        // Nothing listens on this port; the fetch fails and the middleware
        // must allow the request through
        let middleware =
            RobotsMiddleware::new("crawler-core/0.1", Duration::from_millis(200)).unwrap();

        let mut request = CrawlRequest::new(
            Url::parse("http://127.0.0.1:59999/private").unwrap(),
        );
        assert!(middleware.process_request(&mut request).await.is_ok());
    }
}
