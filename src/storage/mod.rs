use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::crawler::task::CrawlResult;
use crate::crawler::dedup::normalize_url;
use crate::error::CrawlError;

/// External result sink. The engine never talks to a database directly; the
/// surrounding application substitutes a database-, file- or broadcast-backed
/// implementation. Implementations must be safe for concurrent writes from
/// multiple workers.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist one crawl result
    async fn store(&self, result: CrawlResult) -> Result<(), CrawlError>;

    /// Fetch the result stored for a URL, `CrawlError::NotFound` on a miss
    async fn get(&self, url: &str) -> Result<CrawlResult, CrawlError>;

    /// All stored results, in no particular order
    async fn get_all(&self) -> Result<Vec<CrawlResult>, CrawlError>;

    /// Drop everything
    async fn clear(&self) -> Result<(), CrawlError>;
}

/// In-memory storage used by tests and simple embeddings
pub struct MemoryStorage {
    results: RwLock<HashMap<String, CrawlResult>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            results: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.results.read().expect("storage lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn store(&self, result: CrawlResult) -> Result<(), CrawlError> {
        let key = normalize_url(&result.url);
        self.results
            .write()
            .expect("storage lock poisoned")
            .insert(key, result);
        Ok(())
    }

    async fn get(&self, url: &str) -> Result<CrawlResult, CrawlError> {
        let key = normalize_url(url);
        self.results
            .read()
            .expect("storage lock poisoned")
            .get(&key)
            .cloned()
            .ok_or_else(|| CrawlError::NotFound {
                url: url.to_string(),
            })
    }

    async fn get_all(&self) -> Result<Vec<CrawlResult>, CrawlError> {
        Ok(self
            .results
            .read()
            .expect("storage lock poisoned")
            .values()
            .cloned()
            .collect())
    }

    async fn clear(&self) -> Result<(), CrawlError> {
        self.results.write().expect("storage lock poisoned").clear();
        Ok(())
    }
}
