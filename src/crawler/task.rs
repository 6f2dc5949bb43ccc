use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// Represents a crawling task waiting in the frontier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlTask {
    /// Normalized URL to crawl
    pub url: String,

    /// Priority of this task (higher values = sooner)
    pub priority: i32,

    /// Current depth in the crawl tree (0 for seed URLs)
    pub depth: u32,

    /// Parent URL that led to this URL (None for seed URLs)
    pub parent_url: Option<String>,

    /// Timestamp when the task entered the frontier
    pub added_at: DateTime<Utc>,

    /// Retry attempt counter (0 for the first fetch)
    pub attempt: u32,
}

impl CrawlTask {
    /// Create a seed task at depth 0
    pub fn seed(url: String, priority: i32) -> Self {
        Self {
            url,
            priority,
            depth: 0,
            parent_url: None,
            added_at: Utc::now(),
            attempt: 0,
        }
    }

    /// Create a task for a link discovered on a parent page
    pub fn discovered(url: String, priority: i32, parent: &CrawlTask) -> Self {
        Self {
            url,
            priority,
            depth: parent.depth + 1,
            parent_url: Some(parent.url.clone()),
            added_at: Utc::now(),
            attempt: 0,
        }
    }

    /// Clone this task for a retry attempt
    pub fn retry(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            added_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// Raw result of a single successful HTTP fetch
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// URL that was fetched
    pub url: String,

    /// Response body
    pub body: String,

    /// Response headers
    pub headers: HashMap<String, String>,

    /// HTTP status code
    pub status_code: u16,

    /// Content type of the response
    pub content_type: String,
}

/// An HTML form found on a page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormInfo {
    /// Form method, uppercased (GET when absent)
    pub method: String,

    /// Form action resolved to an absolute URL where possible
    pub action: String,

    /// Input fields declared inside the form
    pub inputs: Vec<FormInput>,
}

/// A single input field of a form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormInput {
    pub name: String,

    /// Input type attribute ("text" when absent)
    pub input_type: String,

    /// Pre-filled value, if any
    pub value: Option<String>,

    /// Whether the `required` attribute is present
    pub required: bool,
}

/// Result of walking a parsed HTML page once
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseResult {
    /// URL of the page the content came from
    pub url: String,

    /// `<a>` hrefs resolved to absolute URLs
    pub links: Vec<String>,

    /// Page title
    pub title: String,

    /// Whitespace-trimmed text nodes concatenated into one blob
    pub text: String,

    /// Forms found on the page
    pub forms: Vec<FormInfo>,

    /// Resource references grouped by kind ("image", "script", "stylesheet")
    pub resources: HashMap<String, Vec<String>>,

    /// `<meta>` name/content pairs
    pub metadata: HashMap<String, String>,
}

/// A link with attribution metadata, used by the richer extractor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkInfo {
    pub url: String,

    /// Anchor text
    pub text: String,

    /// Whether rel="nofollow" is set
    pub nofollow: bool,

    /// Whether the link points off the page's host
    pub external: bool,
}

/// An image reference with attribution metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageInfo {
    pub url: String,

    /// Alt text, empty when absent
    pub alt: String,
}

/// Richer extraction variant with meta-tag data and a heuristic main-content
/// region
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,

    /// Text of the first matching content-container region, with
    /// script/style sub-elements stripped
    pub main_content: String,

    pub images: Vec<ImageInfo>,
    pub links: Vec<LinkInfo>,
    pub scripts: Vec<String>,
    pub styles: Vec<String>,
}

/// The unit handed to the external result sink, one per processed task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlResult {
    /// URL that was crawled
    pub url: String,

    /// HTTP status code (0 when the request never completed)
    pub status_code: u16,

    /// Content type of the response
    pub content_type: String,

    /// Size of the response body in bytes
    pub content_length: usize,

    /// Parsed page content, absent for non-HTML or failed fetches
    pub parsed: Option<ParseResult>,

    /// Classified error message, if the task failed
    pub error: Option<String>,

    /// Depth at which this URL was crawled
    pub depth: u32,

    /// Parent URL that led to this URL
    pub parent_url: Option<String>,

    /// Time spent downloading the page
    #[serde(with = "duration_millis")]
    pub download_time: Duration,

    /// Time spent in middleware, parsing and filtering
    #[serde(with = "duration_millis")]
    pub processing_time: Duration,

    /// Timestamp when the page was crawled
    pub crawled_at: DateTime<Utc>,
}

/// Serialize durations as integer milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovered_task_depth() {
        let seed = CrawlTask::seed("https://example.com".to_string(), 0);
        assert_eq!(seed.depth, 0);
        assert!(seed.parent_url.is_none());

        let child = CrawlTask::discovered("https://example.com/a".to_string(), 0, &seed);
        assert_eq!(child.depth, 1);
        assert_eq!(child.parent_url.as_deref(), Some("https://example.com"));

        let grandchild = CrawlTask::discovered("https://example.com/b".to_string(), 0, &child);
        assert_eq!(grandchild.depth, 2);
    }

    #[test]
    fn test_retry_increments_attempt() {
        let task = CrawlTask::seed("https://example.com".to_string(), 5);
        let retried = task.retry();
        assert_eq!(retried.attempt, 1);
        assert_eq!(retried.priority, 5);
        assert_eq!(retried.depth, 0);
    }

    #[test]
    fn test_crawl_result_round_trips_through_json() {
        let result = CrawlResult {
            url: "https://example.com".to_string(),
            status_code: 200,
            download_time: Duration::from_millis(120),
            ..Default::default()
        };

        let json = serde_json::to_string(&result).unwrap();
        let back: CrawlResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.url, result.url);
        assert_eq!(back.download_time, Duration::from_millis(120));
    }
}
