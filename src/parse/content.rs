use scraper::{Html, Selector};
use url::Url;

use crate::crawler::task::{ExtractedContent, ImageInfo, LinkInfo};
use crate::error::CrawlError;
use crate::parse::extractor::{collect_text, resolve};

/// Selectors tried in order when hunting for the main content region
const CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    "#content",
    "#main-content",
    "#main",
    ".content",
    ".main-content",
    ".post-content",
    ".article-body",
];

/// Richer extraction variant: meta-tag data plus a heuristic main-content
/// region with script/style sub-elements stripped before text extraction
pub struct ContentExtractor {
    title_selector: Selector,
    link_selector: Selector,
    image_selector: Selector,
    script_selector: Selector,
    stylesheet_selector: Selector,
    content_selectors: Vec<Selector>,
}

impl ContentExtractor {
    pub fn new() -> Self {
        Self {
            title_selector: Selector::parse("title").unwrap(),
            link_selector: Selector::parse("a[href]").unwrap(),
            image_selector: Selector::parse("img[src]").unwrap(),
            script_selector: Selector::parse("script[src]").unwrap(),
            stylesheet_selector: Selector::parse("link[rel=stylesheet][href]").unwrap(),
            content_selectors: CONTENT_SELECTORS
                .iter()
                .map(|s| Selector::parse(s).unwrap())
                .collect(),
        }
    }

    pub fn extract(&self, page_url: &str, html: &str) -> Result<ExtractedContent, CrawlError> {
        let base_url = Url::parse(page_url).map_err(|e| CrawlError::Parse {
            url: page_url.to_string(),
            message: format!("invalid page URL: {}", e),
        })?;

        let document = Html::parse_document(html);

        let title = document
            .select(&self.title_selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let description = meta_content(&document, "description").unwrap_or_default();
        let keywords = meta_content(&document, "keywords")
            .map(|raw| {
                raw.split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        // First match among the common content containers wins; fall back to
        // the whole body
        let main_content = self
            .content_selectors
            .iter()
            .find_map(|selector| document.select(selector).next())
            .map(collect_text)
            .unwrap_or_else(|| collect_text(document.root_element()));

        let page_host = base_url.host_str().map(str::to_lowercase);
        let links = document
            .select(&self.link_selector)
            .filter_map(|el| {
                let href = el.value().attr("href")?;
                let resolved = resolve(&base_url, href)?;
                let nofollow = el
                    .value()
                    .attr("rel")
                    .map(|rel| rel.split_whitespace().any(|token| token == "nofollow"))
                    .unwrap_or(false);
                let external = Url::parse(&resolved)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_lowercase))
                    != page_host;

                Some(LinkInfo {
                    url: resolved,
                    text: el.text().collect::<String>().trim().to_string(),
                    nofollow,
                    external,
                })
            })
            .collect();

        let images = document
            .select(&self.image_selector)
            .filter_map(|el| {
                let src = el.value().attr("src")?;
                Some(ImageInfo {
                    url: resolve(&base_url, src)?,
                    alt: el.value().attr("alt").unwrap_or_default().to_string(),
                })
            })
            .collect();

        let scripts = document
            .select(&self.script_selector)
            .filter_map(|el| el.value().attr("src"))
            .filter_map(|src| resolve(&base_url, src))
            .collect();

        let styles = document
            .select(&self.stylesheet_selector)
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| resolve(&base_url, href))
            .collect();

        Ok(ExtractedContent {
            title,
            description,
            keywords,
            main_content,
            images,
            links,
            scripts,
            styles,
        })
    }
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn meta_content(document: &Html, name: &str) -> Option<String> {
    let selector = Selector::parse(&format!(r#"meta[name="{}"]"#, name)).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
          <head>
            <title>Article Title</title>
            <meta name="description" content="Article description">
            <meta name="keywords" content="rust, crawler, ">
          </head>
          <body>
            <nav>Navigation noise</nav>
            <article>
              <h1>Heading</h1>
              <p>Main paragraph.</p>
              <script>var tracked = 1;</script>
            </article>
            <a href="/internal" rel="nofollow">Internal</a>
            <a href="https://elsewhere.org/x">Elsewhere</a>
            <img src="/pic.jpg" alt="A picture">
          </body>
        </html>
    "#;

    #[test]
    fn test_meta_extraction() {
        let extractor = ContentExtractor::new();
        let content = extractor.extract("https://example.com/a", PAGE).unwrap();

        assert_eq!(content.title, "Article Title");
        assert_eq!(content.description, "Article description");
        assert_eq!(content.keywords, vec!["rust", "crawler"]);
    }

    #[test]
    fn test_main_content_prefers_container_and_strips_scripts() {
        let extractor = ContentExtractor::new();
        let content = extractor.extract("https://example.com/a", PAGE).unwrap();

        assert!(content.main_content.contains("Heading"));
        assert!(content.main_content.contains("Main paragraph."));
        assert!(!content.main_content.contains("Navigation noise"));
        assert!(!content.main_content.contains("tracked"));
    }

    #[test]
    fn test_link_attribution() {
        let extractor = ContentExtractor::new();
        let content = extractor.extract("https://example.com/a", PAGE).unwrap();

        let internal = content
            .links
            .iter()
            .find(|l| l.url == "https://example.com/internal")
            .unwrap();
        assert!(internal.nofollow);
        assert!(!internal.external);

        let elsewhere = content
            .links
            .iter()
            .find(|l| l.url == "https://elsewhere.org/x")
            .unwrap();
        assert!(!elsewhere.nofollow);
        assert!(elsewhere.external);
    }

    #[test]
    fn test_image_alt_text() {
        let extractor = ContentExtractor::new();
        let content = extractor.extract("https://example.com/a", PAGE).unwrap();

        assert_eq!(content.images.len(), 1);
        assert_eq!(content.images[0].url, "https://example.com/pic.jpg");
        assert_eq!(content.images[0].alt, "A picture");
    }

    #[test]
    fn test_fallback_to_body_when_no_container() {
        let extractor = ContentExtractor::new();
        let content = extractor
            .extract(
                "https://example.com/a",
                "<html><body><p>Loose text</p></body></html>",
            )
            .unwrap();

        assert!(content.main_content.contains("Loose text"));
    }
}
