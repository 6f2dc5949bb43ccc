use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use url::Url;
use tracing::debug;

use crate::crawler::task::{FormInfo, FormInput, ParseResult};
use crate::error::CrawlError;

/// Walks parsed HTML once, producing links, forms, resources, text and
/// metadata. Relative references are resolved against the page's own URL.
pub struct PageParser {
    link_selector: Selector,
    form_selector: Selector,
    input_selector: Selector,
    image_selector: Selector,
    script_selector: Selector,
    stylesheet_selector: Selector,
    title_selector: Selector,
    meta_selector: Selector,
}

impl PageParser {
    pub fn new() -> Self {
        // Static selectors, parse cannot fail
        Self {
            link_selector: Selector::parse("a[href]").unwrap(),
            form_selector: Selector::parse("form").unwrap(),
            input_selector: Selector::parse("input, textarea, select").unwrap(),
            image_selector: Selector::parse("img[src]").unwrap(),
            script_selector: Selector::parse("script[src]").unwrap(),
            stylesheet_selector: Selector::parse("link[href]").unwrap(),
            title_selector: Selector::parse("title").unwrap(),
            meta_selector: Selector::parse("meta[name][content]").unwrap(),
        }
    }

    /// Parse one page. `page_url` anchors relative URL resolution.
    pub fn parse(&self, page_url: &str, html: &str) -> Result<ParseResult, CrawlError> {
        let base_url = Url::parse(page_url).map_err(|e| CrawlError::Parse {
            url: page_url.to_string(),
            message: format!("invalid page URL: {}", e),
        })?;

        let document = Html::parse_document(html);

        let links = self.collect_links(&document, &base_url);
        let forms = self.collect_forms(&document, &base_url);
        let resources = self.collect_resources(&document, &base_url);
        let metadata = self.collect_metadata(&document);

        let title = document
            .select(&self.title_selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let text = collect_text(document.root_element());

        debug!(
            "Parsed {}: {} links, {} forms",
            page_url,
            links.len(),
            forms.len()
        );

        Ok(ParseResult {
            url: page_url.to_string(),
            links,
            title,
            text,
            forms,
            resources,
            metadata,
        })
    }

    fn collect_links(&self, document: &Html, base_url: &Url) -> Vec<String> {
        document
            .select(&self.link_selector)
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| resolve(base_url, href))
            .collect()
    }

    fn collect_forms(&self, document: &Html, base_url: &Url) -> Vec<FormInfo> {
        document
            .select(&self.form_selector)
            .map(|form| {
                let method = form
                    .value()
                    .attr("method")
                    .unwrap_or("GET")
                    .to_uppercase();
                let action = form
                    .value()
                    .attr("action")
                    .and_then(|action| resolve(base_url, action))
                    .unwrap_or_else(|| base_url.to_string());

                let inputs = form
                    .select(&self.input_selector)
                    .map(|input| FormInput {
                        name: input.value().attr("name").unwrap_or_default().to_string(),
                        input_type: input
                            .value()
                            .attr("type")
                            .unwrap_or("text")
                            .to_string(),
                        value: input.value().attr("value").map(str::to_string),
                        required: input.value().attr("required").is_some(),
                    })
                    .collect();

                FormInfo {
                    method,
                    action,
                    inputs,
                }
            })
            .collect()
    }

    fn collect_resources(
        &self,
        document: &Html,
        base_url: &Url,
    ) -> HashMap<String, Vec<String>> {
        let mut resources: HashMap<String, Vec<String>> = HashMap::new();

        let images: Vec<String> = document
            .select(&self.image_selector)
            .filter_map(|el| el.value().attr("src"))
            .filter_map(|src| resolve(base_url, src))
            .collect();
        if !images.is_empty() {
            resources.insert("image".to_string(), images);
        }

        let scripts: Vec<String> = document
            .select(&self.script_selector)
            .filter_map(|el| el.value().attr("src"))
            .filter_map(|src| resolve(base_url, src))
            .collect();
        if !scripts.is_empty() {
            resources.insert("script".to_string(), scripts);
        }

        let stylesheets: Vec<String> = document
            .select(&self.stylesheet_selector)
            .filter(|el| {
                el.value()
                    .attr("rel")
                    .map(|rel| rel.eq_ignore_ascii_case("stylesheet"))
                    .unwrap_or(true)
            })
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| resolve(base_url, href))
            .collect();
        if !stylesheets.is_empty() {
            resources.insert("stylesheet".to_string(), stylesheets);
        }

        resources
    }

    fn collect_metadata(&self, document: &Html) -> HashMap<String, String> {
        document
            .select(&self.meta_selector)
            .filter_map(|el| {
                let name = el.value().attr("name")?;
                let content = el.value().attr("content")?;
                Some((name.to_lowercase(), content.to_string()))
            })
            .collect()
    }
}

impl Default for PageParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a possibly relative reference against the page URL, dropping
/// non-HTTP schemes (mailto:, javascript:, ...)
pub(crate) fn resolve(base_url: &Url, reference: &str) -> Option<String> {
    let joined = match Url::parse(reference) {
        Ok(absolute) => absolute,
        Err(_) => base_url.join(reference).ok()?,
    };

    match joined.scheme() {
        "http" | "https" => Some(joined.to_string()),
        _ => None,
    }
}

/// Concatenate whitespace-trimmed text nodes into a single blob, skipping
/// script and style subtrees
pub(crate) fn collect_text(root: ElementRef) -> String {
    let mut parts: Vec<String> = Vec::new();
    walk_text(root, &mut parts);
    parts.join(" ")
}

fn walk_text(el: ElementRef, parts: &mut Vec<String>) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        } else if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            if name != "script" && name != "style" {
                walk_text(child_el, parts);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
          <head>
            <title> Example Page </title>
            <meta name="description" content="A test page">
            <meta name="keywords" content="alpha, beta">
            <link rel="stylesheet" href="/css/site.css">
            <script src="/js/app.js"></script>
          </head>
          <body>
            <h1>Welcome</h1>
            <p>Some   text here.</p>
            <a href="/about">About</a>
            <a href="https://other.com/page">External</a>
            <a href="mailto:someone@example.com">Mail</a>
            <img src="/img/logo.png" alt="Logo">
            <form method="post" action="/login">
              <input type="text" name="username" required>
              <input type="password" name="password" required>
              <input type="hidden" name="csrf" value="token123">
            </form>
            <script>var ignored = "hidden";</script>
          </body>
        </html>
    "#;

    #[test]
    fn test_links_resolved_to_absolute() {
        let parser = PageParser::new();
        let result = parser.parse("https://example.com/start", PAGE).unwrap();

        assert!(result.links.contains(&"https://example.com/about".to_string()));
        assert!(result.links.contains(&"https://other.com/page".to_string()));
        // mailto: dropped
        assert_eq!(result.links.len(), 2);
    }

    #[test]
    fn test_title_and_metadata() {
        let parser = PageParser::new();
        let result = parser.parse("https://example.com/start", PAGE).unwrap();

        assert_eq!(result.title, "Example Page");
        assert_eq!(result.metadata.get("description").unwrap(), "A test page");
        assert_eq!(result.metadata.get("keywords").unwrap(), "alpha, beta");
    }

    #[test]
    fn test_form_extraction() {
        let parser = PageParser::new();
        let result = parser.parse("https://example.com/start", PAGE).unwrap();

        assert_eq!(result.forms.len(), 1);
        let form = &result.forms[0];
        assert_eq!(form.method, "POST");
        assert_eq!(form.action, "https://example.com/login");
        assert_eq!(form.inputs.len(), 3);

        let username = &form.inputs[0];
        assert_eq!(username.name, "username");
        assert!(username.required);

        let csrf = &form.inputs[2];
        assert!(!csrf.required);
        assert_eq!(csrf.value.as_deref(), Some("token123"));
    }

    #[test]
    fn test_resources_grouped_by_kind() {
        let parser = PageParser::new();
        let result = parser.parse("https://example.com/start", PAGE).unwrap();

        assert_eq!(
            result.resources.get("image").unwrap(),
            &vec!["https://example.com/img/logo.png".to_string()]
        );
        assert_eq!(
            result.resources.get("script").unwrap(),
            &vec!["https://example.com/js/app.js".to_string()]
        );
        assert_eq!(
            result.resources.get("stylesheet").unwrap(),
            &vec!["https://example.com/css/site.css".to_string()]
        );
    }

    #[test]
    fn test_text_blob_skips_scripts() {
        let parser = PageParser::new();
        let result = parser.parse("https://example.com/start", PAGE).unwrap();

        assert!(result.text.contains("Welcome"));
        assert!(result.text.contains("Some   text here."));
        assert!(!result.text.contains("hidden"));
    }

    #[test]
    fn test_invalid_page_url_is_parse_error() {
        let parser = PageParser::new();
        let err = parser.parse("not a url", PAGE).unwrap_err();
        assert!(matches!(err, CrawlError::Parse { .. }));
    }
}
