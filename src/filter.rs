use std::collections::HashSet;
use regex::Regex;
use url::Url;
use tracing::warn;

use crate::crawler::task::ParseResult;

/// Accept/reject predicate for discovered URLs, applied before enqueue
pub trait UrlFilter: Send + Sync {
    fn accept(&self, url: &Url) -> bool;
}

/// Accept/reject predicate for parsed results, applied before the result is
/// handed to the sink
pub trait ResultFilter: Send + Sync {
    fn accept(&self, result: &ParseResult) -> bool;
}

/// Accepts URLs whose path has no extension, or whose extension is in the
/// allow-set (case-insensitive)
pub struct FileExtensionFilter {
    allowed: HashSet<String>,
}

impl FileExtensionFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
            .collect();
        Self { allowed }
    }
}

impl UrlFilter for FileExtensionFilter {
    fn accept(&self, url: &Url) -> bool {
        let path = url.path();
        let last_segment = path.rsplit('/').next().unwrap_or("");

        match last_segment.rsplit_once('.') {
            // A leading dot ("/.well-known") is not an extension
            Some((name, ext)) if !name.is_empty() => {
                self.allowed.contains(&ext.to_lowercase())
            }
            _ => true,
        }
    }
}

/// Accepts URLs whose hostname is in the allow-set; in suffix-match mode
/// subdomains of an allowed domain pass as well
pub struct DomainFilter {
    domains: HashSet<String>,
    match_subdomains: bool,
}

impl DomainFilter {
    pub fn new<I, S>(domains: I, match_subdomains: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .map(|d| d.as_ref().to_lowercase())
            .collect();
        Self {
            domains,
            match_subdomains,
        }
    }
}

impl UrlFilter for DomainFilter {
    fn accept(&self, url: &Url) -> bool {
        let host = match url.host_str() {
            Some(host) => host.to_lowercase(),
            None => return false,
        };

        if self.domains.contains(&host) {
            return true;
        }

        if self.match_subdomains {
            return self
                .domains
                .iter()
                .any(|domain| host.ends_with(&format!(".{}", domain)));
        }

        false
    }
}

/// Accepts a parsed result when **any** pattern matches its URL (logical OR
/// across patterns). Invalid patterns are skipped with a warning, like the
/// rest of the engine treats bad user-supplied regexes.
pub struct RegexFilter {
    patterns: Vec<Regex>,
}

impl RegexFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .filter_map(|pattern| match Regex::new(pattern.as_ref()) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    warn!("Invalid result filter pattern '{}': {}", pattern.as_ref(), e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }
}

impl ResultFilter for RegexFilter {
    fn accept(&self, result: &ParseResult) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern.is_match(&result.url))
    }
}

/// Accepts a URL only if **all** member filters accept (logical AND).
///
/// Note the asymmetry with [`RegexFilter`]: a single multi-pattern filter is
/// an OR, a composite of filters is an AND.
pub struct CompositeUrlFilter {
    filters: Vec<Box<dyn UrlFilter>>,
}

impl CompositeUrlFilter {
    pub fn new(filters: Vec<Box<dyn UrlFilter>>) -> Self {
        Self { filters }
    }
}

impl UrlFilter for CompositeUrlFilter {
    fn accept(&self, url: &Url) -> bool {
        self.filters.iter().all(|filter| filter.accept(url))
    }
}

/// AND-composition over result filters
pub struct CompositeResultFilter {
    filters: Vec<Box<dyn ResultFilter>>,
}

impl CompositeResultFilter {
    pub fn new(filters: Vec<Box<dyn ResultFilter>>) -> Self {
        Self { filters }
    }
}

impl ResultFilter for CompositeResultFilter {
    fn accept(&self, result: &ParseResult) -> bool {
        self.filters.iter().all(|filter| filter.accept(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn result_for(u: &str) -> ParseResult {
        ParseResult {
            url: u.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_extension_filter_accepts_no_extension() {
        let filter = FileExtensionFilter::new(["html", "php"]);
        assert!(filter.accept(&url("https://example.com/about")));
        assert!(filter.accept(&url("https://example.com/")));
    }

    #[test]
    fn test_extension_filter_allow_set_is_case_insensitive() {
        let filter = FileExtensionFilter::new(["HTML"]);
        assert!(filter.accept(&url("https://example.com/index.html")));
        assert!(filter.accept(&url("https://example.com/INDEX.HTML")));
        assert!(!filter.accept(&url("https://example.com/logo.png")));
    }

    #[test]
    fn test_domain_filter_exact_and_suffix_modes() {
        let exact = DomainFilter::new(["example.com"], false);
        assert!(exact.accept(&url("https://example.com/page")));
        assert!(!exact.accept(&url("https://blog.example.com/page")));
        assert!(!exact.accept(&url("https://other.com/page")));

        let suffix = DomainFilter::new(["example.com"], true);
        assert!(suffix.accept(&url("https://blog.example.com/page")));
        assert!(!suffix.accept(&url("https://notexample.com/page")));
    }

    #[test]
    fn test_regex_filter_any_pattern_accepts() {
        let filter = RegexFilter::new([r"/articles/", r"/news/"]);
        assert!(filter.accept(&result_for("https://example.com/articles/1")));
        assert!(filter.accept(&result_for("https://example.com/news/today")));
        assert!(!filter.accept(&result_for("https://example.com/about")));
    }

    #[test]
    fn test_invalid_regex_is_skipped() {
        let filter = RegexFilter::new([r"(unclosed", r"/ok/"]);
        assert!(filter.accept(&result_for("https://example.com/ok/1")));
    }

    #[test]
    fn test_composite_requires_all_members() {
        let composite = CompositeUrlFilter::new(vec![
            Box::new(DomainFilter::new(["example.com"], false)),
            Box::new(FileExtensionFilter::new(["html"])),
        ]);

        assert!(composite.accept(&url("https://example.com/index.html")));
        assert!(!composite.accept(&url("https://example.com/logo.png")));
        assert!(!composite.accept(&url("https://other.com/index.html")));
    }
}
