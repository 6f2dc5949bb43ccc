pub mod dedup;
pub mod depth;
pub mod frontier;
pub mod pool;
pub mod ratelimit;
pub mod stats;
pub mod task;

// Re-export common types
pub use dedup::{normalize_url, VisitedSet};
pub use depth::DepthTracker;
pub use frontier::Frontier;
pub use pool::Crawler;
pub use ratelimit::DomainRateLimiter;
pub use stats::{CrawlStats, StatsCollector};
pub use task::{CrawlResult, CrawlTask, ExtractedContent, FetchResult, ParseResult};
