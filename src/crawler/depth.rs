use std::collections::HashMap;
use std::sync::RwLock;

use crate::crawler::dedup::normalize_url;

/// Per-URL depth bookkeeping. Depths are assigned when a URL is discovered
/// and consulted before its links are enqueued.
pub struct DepthTracker {
    depths: RwLock<HashMap<String, u32>>,
}

impl DepthTracker {
    pub fn new() -> Self {
        Self {
            depths: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_depth(&self, url: &str, depth: u32) {
        self.depths
            .write()
            .expect("depth tracker lock poisoned")
            .insert(normalize_url(url), depth);
    }

    /// Recorded depth, defaulting to 0 for unknown URLs
    pub fn depth_of(&self, url: &str) -> u32 {
        self.depths
            .read()
            .expect("depth tracker lock poisoned")
            .get(&normalize_url(url))
            .copied()
            .unwrap_or(0)
    }

    /// Whether the URL sits at or beyond the depth limit. A limit of 0
    /// means unlimited and never exceeds.
    pub fn is_exceeded(&self, url: &str, max_depth: u32) -> bool {
        if max_depth == 0 {
            return false;
        }
        self.depth_of(url) >= max_depth
    }

    pub fn clear(&self) {
        self.depths
            .write()
            .expect("depth tracker lock poisoned")
            .clear();
    }
}

impl Default for DepthTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_url_defaults_to_zero() {
        let tracker = DepthTracker::new();
        assert_eq!(tracker.depth_of("https://example.com/unknown"), 0);
    }

    #[test]
    fn test_zero_max_depth_is_unlimited() {
        let tracker = DepthTracker::new();
        tracker.set_depth("https://example.com/deep", 1000);
        assert!(!tracker.is_exceeded("https://example.com/deep", 0));
    }

    #[test]
    fn test_is_exceeded_at_boundary() {
        let tracker = DepthTracker::new();
        tracker.set_depth("https://example.com/a", 1);
        tracker.set_depth("https://example.com/b", 2);

        assert!(!tracker.is_exceeded("https://example.com/a", 2));
        assert!(tracker.is_exceeded("https://example.com/b", 2));
    }

    #[test]
    fn test_depth_keyed_by_normalized_url() {
        let tracker = DepthTracker::new();
        tracker.set_depth("https://EXAMPLE.com/page", 3);
        assert_eq!(tracker.depth_of("https://example.com/page"), 3);
    }
}
