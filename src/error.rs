use thiserror::Error;

/// Classified crawl failures.
///
/// The classification drives orchestration: `Retryable` tasks may re-enter
/// the frontier, `Policy` rejections are recorded but never counted as
/// failures, everything else ends the task.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Network-level failure while fetching a page
    #[error("transport error fetching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response body could not be parsed
    #[error("parse error for {url}: {message}")]
    Parse { url: String, message: String },

    /// The request was refused by crawl policy (robots.txt, filters)
    #[error("policy rejection for {url}: {reason}")]
    Policy { url: String, reason: String },

    /// A response classified as retryable by the middleware chain
    #[error("retryable response {status} for {url}")]
    Retryable { url: String, status: u16 },

    /// Headless rendering failed
    #[error("render error for {url}: {message}")]
    Render { url: String, message: String },

    /// Configuration rejected before the session started
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Start was called on a session that already left the Idle state
    #[error("crawler is already running")]
    AlreadyRunning,

    /// The result sink has no entry for the URL
    #[error("no stored result for {url}")]
    NotFound { url: String },
}

impl CrawlError {
    /// Bucket name used for the per-type error breakdown
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Parse { .. } => "parse",
            Self::Policy { .. } => "policy",
            Self::Retryable { .. } => "retryable",
            Self::Render { .. } => "render",
            Self::InvalidConfig(_) => "config",
            Self::AlreadyRunning => "lifecycle",
            Self::NotFound { .. } => "not_found",
        }
    }

    /// Whether this error counts toward the session failure counter. Policy
    /// rejections are expected behavior, not failures.
    pub fn counts_as_failure(&self) -> bool {
        !matches!(self, Self::Policy { .. })
    }
}

pub type Result<T> = std::result::Result<T, CrawlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_is_not_a_failure() {
        let err = CrawlError::Policy {
            url: "https://example.com/private".to_string(),
            reason: "disallowed by robots.txt".to_string(),
        };
        assert!(!err.counts_as_failure());
        assert_eq!(err.error_type(), "policy");
    }

    #[test]
    fn test_retryable_is_a_failure_when_budget_exhausted() {
        let err = CrawlError::Retryable {
            url: "https://example.com".to_string(),
            status: 503,
        };
        assert!(err.counts_as_failure());
        assert_eq!(err.error_type(), "retryable");
    }

    #[test]
    fn test_display_carries_context() {
        let err = CrawlError::Parse {
            url: "https://example.com".to_string(),
            message: "truncated document".to_string(),
        };
        assert!(err.to_string().contains("https://example.com"));
        assert!(err.to_string().contains("truncated document"));
    }
}
