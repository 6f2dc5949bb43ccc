pub mod client;
pub mod middleware;
pub mod render;
pub mod robots;

// Re-export common types
pub use client::Fetcher;
pub use middleware::{
    CrawlRequest, Middleware, MiddlewareChain, ProxyMiddleware, RetryMiddleware,
    UserAgentMiddleware,
};
pub use render::{BrowserRenderer, PageRenderer};
pub use robots::{RobotsMiddleware, RobotsPolicy};
