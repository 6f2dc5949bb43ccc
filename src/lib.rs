//! Embeddable web-crawling engine.
//!
//! A [`Crawler`] pulls tasks from a priority frontier, fetches them through a
//! middleware chain (user agent, retry classification, robots.txt, proxy),
//! parses the HTML and hands [`CrawlResult`]s to a pluggable [`Storage`]
//! sink. Per-domain rate limiting, depth limits, URL/result filters and an
//! optional headless renderer are all configured through [`CrawlerOptions`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use crawler_core::{Crawler, CrawlerOptions, MemoryStorage};
//!
//! # async fn run() -> Result<(), crawler_core::CrawlError> {
//! let storage = Arc::new(MemoryStorage::new());
//! let crawler = Crawler::new(CrawlerOptions::default(), storage.clone())?;
//!
//! crawler.start().await?;
//! crawler.add_url("https://example.com");
//! crawler.wait_until_idle().await;
//! crawler.stop().await;
//!
//! println!("crawled {} pages", crawler.stats().pages_visited);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod logging;
pub mod parse;
pub mod storage;

// Re-export the embedding surface
pub use config::{CrawlSettings, CrawlerOptions, SchedulerType};
pub use crawler::{CrawlResult, CrawlStats, CrawlTask, Crawler, ExtractedContent, ParseResult};
pub use error::CrawlError;
pub use fetch::{CrawlRequest, Middleware, PageRenderer};
pub use filter::{
    CompositeResultFilter, CompositeUrlFilter, DomainFilter, FileExtensionFilter, RegexFilter,
    ResultFilter, UrlFilter,
};
pub use parse::{ContentExtractor, PageParser};
pub use storage::{MemoryStorage, Storage};
