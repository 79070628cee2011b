//! Record extraction from fetched pages
//!
//! Applies a target's selector map to one page and produces a record. A
//! selector that matches nothing leaves its field absent, not empty; one
//! match yields the element's text and several matches yield a list of
//! texts. Optional extras add outbound links, image URLs, and meta tags.

use crate::config::CrawlTarget;
use crate::fetch::RawPage;
use crate::record::{FieldValue, Record};
use crate::ExtractError;
use scraper::{Html, Selector};
use tracing::warn;
use url::Url;

/// Everything pulled out of one page
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    /// The page's record, implicit context fields already set
    pub record: Record,

    /// Candidate next-page URLs in document order, empty unless the
    /// target paginates
    pub next_urls: Vec<Url>,
}

/// A target's selector map, compiled once per crawl
///
/// Selectors are validated at configuration load, so compilation normally
/// keeps every field. A selector that still fails to parse (targets built
/// in code) degrades: the field is dropped with a warning and extraction
/// carries on without it.
pub struct SelectorSet {
    fields: Vec<(String, Selector)>,
    next_page: Option<Selector>,
}

impl SelectorSet {
    pub fn compile(target: &CrawlTarget) -> Self {
        let mut fields = Vec::with_capacity(target.selectors.len());
        for (name, raw) in &target.selectors {
            match compile_selector(name, raw) {
                Ok(selector) => fields.push((name.clone(), selector)),
                Err(e) => warn!(site = %target.name, "{e}"),
            }
        }

        let next_page = target.pagination.as_ref().filter(|p| p.enabled).and_then(|p| {
            match compile_selector("next-page", &p.next_selector) {
                Ok(selector) => Some(selector),
                Err(e) => {
                    warn!(site = %target.name, "{e}; pagination disabled");
                    None
                }
            }
        });

        Self { fields, next_page }
    }
}

fn compile_selector(name: &str, raw: &str) -> Result<Selector, ExtractError> {
    Selector::parse(raw).map_err(|e| ExtractError::Selector {
        name: name.to_string(),
        message: e.to_string(),
    })
}

/// Extracts one page into a record plus pagination candidates
pub fn extract_page(page: &RawPage, target: &CrawlTarget, selectors: &SelectorSet) -> ExtractedPage {
    let document = Html::parse_document(&page.body);
    let mut record = Record::with_context(&target.name, &page.url, page.fetched_at);

    for (field, selector) in &selectors.fields {
        if let Some(value) = select_texts(&document, selector) {
            record.insert(field.clone(), value);
        }
    }

    if target.extract.links {
        record.insert("links", FieldValue::List(extract_links(&document, &page.url)));
    }

    if target.extract.images {
        record.insert("images", FieldValue::List(extract_images(&document, &page.url)));
    }

    if target.extract.metadata {
        extract_metadata(&document, &mut record);
    }

    let next_urls = match &selectors.next_page {
        Some(selector) => extract_next_urls(&document, selector, &page.url),
        None => Vec::new(),
    };

    ExtractedPage { record, next_urls }
}

/// Collects the trimmed text of every match for a selector
///
/// Returns None when nothing matches, so the field stays absent.
fn select_texts(document: &Html, selector: &Selector) -> Option<FieldValue> {
    let mut texts: Vec<String> = document
        .select(selector)
        .map(|element| element.text().collect::<String>().trim().to_string())
        .collect();

    match texts.len() {
        0 => None,
        1 => Some(FieldValue::Text(texts.remove(0))),
        _ => Some(FieldValue::List(texts)),
    }
}

/// Extracts all outbound link URLs from the document
fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            if let Some(href) = element.value().attr("href") {
                if let Some(url) = resolve_link(href, base_url) {
                    links.push(url.to_string());
                }
            }
        }
    }

    links
}

/// Extracts all image URLs from the document
fn extract_images(document: &Html, base_url: &Url) -> Vec<String> {
    let mut images = Vec::new();

    if let Ok(selector) = Selector::parse("img[src]") {
        for element in document.select(&selector) {
            if let Some(src) = element.value().attr("src") {
                if let Some(url) = resolve_link(src, base_url) {
                    images.push(url.to_string());
                }
            }
        }
    }

    images
}

/// Adds `meta_*` fields for every named meta tag
///
/// Both `name` and `property` metas count, so OpenGraph tags come through
/// as fields like `meta_og:title`. The `<title>` element fills the `title`
/// field unless a selector already produced one.
fn extract_metadata(document: &Html, record: &mut Record) {
    for attribute in ["name", "property"] {
        let raw = format!("meta[{}][content]", attribute);
        if let Ok(selector) = Selector::parse(&raw) {
            for element in document.select(&selector) {
                if let (Some(name), Some(content)) = (
                    element.value().attr(attribute),
                    element.value().attr("content"),
                ) {
                    record.insert(format!("meta_{}", name), content.to_string());
                }
            }
        };
    }

    if record.get("title").is_none() {
        if let Ok(selector) = Selector::parse("title") {
            if let Some(element) = document.select(&selector).next() {
                let text = element.text().collect::<String>().trim().to_string();
                if !text.is_empty() {
                    record.insert("title", text);
                }
            }
        }
    }
}

/// Collects candidate next-page URLs in document order
///
/// Matches may be `<a>` elements or containers holding one; the first
/// href found per match wins.
fn extract_next_urls(document: &Html, selector: &Selector, base_url: &Url) -> Vec<Url> {
    let mut urls = Vec::new();

    for element in document.select(selector) {
        let href = element.value().attr("href").or_else(|| {
            element
                .select(&Selector::parse("a[href]").ok()?)
                .next()?
                .value()
                .attr("href")
        });

        if let Some(href) = href {
            if let Some(url) = resolve_link(href, base_url) {
                urls.push(url);
            }
        }
    }

    urls
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Invalid or non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    if href.starts_with('#') {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) => {
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                Some(absolute_url)
            } else {
                None
            }
        }
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtractOptions, PaginationConfig, ScrapeMode};
    use chrono::Utc;

    fn test_target(selectors: &[(&str, &str)]) -> CrawlTarget {
        CrawlTarget {
            name: "test".to_string(),
            urls: vec![Url::parse("https://example.com/page").unwrap()],
            mode: ScrapeMode::Http,
            selectors: selectors
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            pagination: None,
            login: None,
            extract: ExtractOptions::default(),
        }
    }

    fn test_page(html: &str) -> RawPage {
        RawPage {
            url: Url::parse("https://example.com/page").unwrap(),
            status: 200,
            body: html.to_string(),
            fetched_at: Utc::now(),
        }
    }

    fn run_extract(html: &str, target: &CrawlTarget) -> ExtractedPage {
        let selectors = SelectorSet::compile(target);
        extract_page(&test_page(html), target, &selectors)
    }

    #[test]
    fn test_single_match_yields_text() {
        let target = test_target(&[("title", "h1")]);
        let page = run_extract("<html><body><h1>  Hello  </h1></body></html>", &target);

        assert_eq!(page.record.text("title"), Some("Hello".to_string()));
    }

    #[test]
    fn test_multiple_matches_yield_list() {
        let target = test_target(&[("items", "li")]);
        let page = run_extract(
            "<html><body><ul><li>one</li><li>two</li></ul></body></html>",
            &target,
        );

        assert_eq!(
            page.record.get("items"),
            Some(&FieldValue::List(vec![
                "one".to_string(),
                "two".to_string()
            ]))
        );
    }

    #[test]
    fn test_no_match_leaves_field_absent() {
        let target = test_target(&[("title", "h1"), ("author", ".byline")]);
        let page = run_extract("<html><body><h1>Post</h1></body></html>", &target);

        assert_eq!(page.record.text("title"), Some("Post".to_string()));
        assert!(page.record.get("author").is_none());
    }

    #[test]
    fn test_matched_but_empty_element_is_empty_text() {
        // An empty match is a value; only a missing match is absent
        let target = test_target(&[("note", ".note")]);
        let page = run_extract(r#"<html><body><div class="note"></div></body></html>"#, &target);

        assert_eq!(page.record.get("note"), Some(&FieldValue::Text(String::new())));
    }

    #[test]
    fn test_implicit_context_fields() {
        let target = test_target(&[]);
        let page = run_extract("<html><body></body></html>", &target);

        assert_eq!(page.record.text("site"), Some("test".to_string()));
        assert_eq!(
            page.record.text("url"),
            Some("https://example.com/page".to_string())
        );
        assert!(page.record.get("fetched_at").is_some());
    }

    #[test]
    fn test_invalid_selector_degrades_to_absent_field() {
        let target = test_target(&[("title", "h1"), ("bad", ":::nope")]);
        let page = run_extract("<html><body><h1>Post</h1></body></html>", &target);

        assert_eq!(page.record.text("title"), Some("Post".to_string()));
        assert!(page.record.get("bad").is_none());
    }

    #[test]
    fn test_extract_links_resolves_and_filters() {
        let mut target = test_target(&[]);
        target.extract.links = true;
        let page = run_extract(
            r##"<html><body>
                <a href="/valid">Valid</a>
                <a href="https://other.com/page">Absolute</a>
                <a href="javascript:void(0)">Skip</a>
                <a href="mailto:a@b.com">Skip</a>
                <a href="#anchor">Skip</a>
            </body></html>"##,
            &target,
        );

        assert_eq!(
            page.record.get("links"),
            Some(&FieldValue::List(vec![
                "https://example.com/valid".to_string(),
                "https://other.com/page".to_string(),
            ]))
        );
    }

    #[test]
    fn test_extract_images() {
        let mut target = test_target(&[]);
        target.extract.images = true;
        let page = run_extract(
            r#"<html><body><img src="/a.png"><img src="https://cdn.example.com/b.jpg"></body></html>"#,
            &target,
        );

        assert_eq!(
            page.record.get("images"),
            Some(&FieldValue::List(vec![
                "https://example.com/a.png".to_string(),
                "https://cdn.example.com/b.jpg".to_string(),
            ]))
        );
    }

    #[test]
    fn test_extract_metadata_names_and_properties() {
        let mut target = test_target(&[]);
        target.extract.metadata = true;
        let page = run_extract(
            r#"<html><head>
                <meta name="description" content="A page">
                <meta property="og:title" content="Shared title">
                <meta charset="utf-8">
            </head><body></body></html>"#,
            &target,
        );

        assert_eq!(
            page.record.text("meta_description"),
            Some("A page".to_string())
        );
        assert_eq!(
            page.record.text("meta_og:title"),
            Some("Shared title".to_string())
        );
    }

    #[test]
    fn test_metadata_fills_title_from_title_element() {
        let mut target = test_target(&[]);
        target.extract.metadata = true;
        let page = run_extract(
            "<html><head><title> Page Title </title></head><body></body></html>",
            &target,
        );

        assert_eq!(page.record.text("title"), Some("Page Title".to_string()));
    }

    #[test]
    fn test_metadata_title_defers_to_selector_field() {
        let mut target = test_target(&[("title", "h1")]);
        target.extract.metadata = true;
        let page = run_extract(
            "<html><head><title>Head Title</title></head><body><h1>Body Title</h1></body></html>",
            &target,
        );

        assert_eq!(page.record.text("title"), Some("Body Title".to_string()));
    }

    #[test]
    fn test_next_urls_in_document_order() {
        let mut target = test_target(&[]);
        target.pagination = Some(PaginationConfig {
            enabled: true,
            next_selector: "a.next".to_string(),
            max_pages: 10,
        });
        let page = run_extract(
            r#"<html><body>
                <a class="next" href="/page/2">Next</a>
                <a class="next" href="/page/3">Next again</a>
            </body></html>"#,
            &target,
        );

        let urls: Vec<String> = page.next_urls.iter().map(|u| u.to_string()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/page/2".to_string(),
                "https://example.com/page/3".to_string(),
            ]
        );
    }

    #[test]
    fn test_next_url_inside_container() {
        let mut target = test_target(&[]);
        target.pagination = Some(PaginationConfig {
            enabled: true,
            next_selector: "div.pager".to_string(),
            max_pages: 10,
        });
        let page = run_extract(
            r#"<html><body><div class="pager"><a href="/page/2">Next</a></div></body></html>"#,
            &target,
        );

        assert_eq!(page.next_urls.len(), 1);
        assert_eq!(page.next_urls[0].as_str(), "https://example.com/page/2");
    }

    #[test]
    fn test_disabled_pagination_yields_no_next_urls() {
        let mut target = test_target(&[]);
        target.pagination = Some(PaginationConfig {
            enabled: false,
            next_selector: "a.next".to_string(),
            max_pages: 10,
        });
        let page = run_extract(
            r#"<html><body><a class="next" href="/page/2">Next</a></body></html>"#,
            &target,
        );

        assert!(page.next_urls.is_empty());
    }

    #[test]
    fn test_selector_map_order_is_stable() {
        let target = test_target(&[("a_first", "h1"), ("b_second", "h2")]);
        let page = run_extract(
            "<html><body><h1>one</h1><h2>two</h2></body></html>",
            &target,
        );

        let names: Vec<&str> = page.record.field_names().collect();
        assert_eq!(names, vec!["a_first", "b_second", "fetched_at", "site", "url"]);
    }

    #[test]
    fn test_resolve_link_rules() {
        let base = Url::parse("https://example.com/dir/page").unwrap();

        assert_eq!(
            resolve_link("/other", &base).map(|u| u.to_string()),
            Some("https://example.com/other".to_string())
        );
        assert_eq!(
            resolve_link("sibling", &base).map(|u| u.to_string()),
            Some("https://example.com/dir/sibling".to_string())
        );
        assert!(resolve_link("", &base).is_none());
        assert!(resolve_link("javascript:void(0)", &base).is_none());
        assert!(resolve_link("tel:+123", &base).is_none());
        assert!(resolve_link("data:text/html,x", &base).is_none());
        assert!(resolve_link("#top", &base).is_none());
        assert!(resolve_link("ftp://example.com/f", &base).is_none());
    }
}
