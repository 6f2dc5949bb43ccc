use std::collections::HashSet;
use std::sync::RwLock;
use url::Url;

/// Concurrent "already queued/visited" membership set keyed by normalized
/// URL. The check-and-mark is atomic: no two callers can both observe
/// "not seen" for the same URL.
pub struct VisitedSet {
    seen: RwLock<HashSet<String>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self {
            seen: RwLock::new(HashSet::new()),
        }
    }

    /// Returns true if this is the first time the URL is seen. The insert
    /// happens under the same write lock as the check.
    pub fn check_and_mark(&self, url: &str) -> bool {
        let normalized = normalize_url(url);
        self.seen
            .write()
            .expect("visited set lock poisoned")
            .insert(normalized)
    }

    /// Presence check without marking
    pub fn contains(&self, url: &str) -> bool {
        let normalized = normalize_url(url);
        self.seen
            .read()
            .expect("visited set lock poisoned")
            .contains(&normalized)
    }

    pub fn len(&self) -> usize {
        self.seen.read().expect("visited set lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.seen.write().expect("visited set lock poisoned").clear();
    }
}

impl Default for VisitedSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize a URL to avoid duplicates due to minor differences
pub fn normalize_url(url: &str) -> String {
    let parsed_url = match Url::parse(url) {
        Ok(url) => url,
        Err(_) => return url.to_string(), // Can't normalize, return as is
    };

    let mut normalized = parsed_url;

    // Remove default ports
    if let Some(port) = normalized.port() {
        if (normalized.scheme() == "http" && port == 80)
            || (normalized.scheme() == "https" && port == 443)
        {
            let _ = normalized.set_port(None);
        }
    }

    // Remove trailing slash on the root path
    if normalized.path() == "/" {
        normalized.set_path("");
    }

    // Ensure host is lowercase
    if let Some(host) = normalized.host_str() {
        let lowercase_host = host.to_lowercase();
        if host != lowercase_host {
            let replaced = normalized.to_string().replace(host, &lowercase_host);
            if let Ok(temp_url) = Url::parse(&replaced) {
                normalized = temp_url;
            }
        }
    }

    // Sort query parameters if present
    if let Some(query) = normalized.query() {
        if !query.is_empty() {
            let mut params: Vec<(String, String)> = query
                .split('&')
                .map(|pair| {
                    let mut kv = pair.split('=');
                    let k = kv.next().unwrap_or("").to_string();
                    let v = kv.next().unwrap_or("").to_string();
                    (k, v)
                })
                .collect();

            params.sort_by(|a, b| a.0.cmp(&b.0));

            let sorted_query = params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<String>>()
                .join("&");

            normalized.set_query(Some(&sorted_query));
        }
    }

    // Remove fragments (anchors)
    normalized.set_fragment(None);

    normalized.to_string()
}
