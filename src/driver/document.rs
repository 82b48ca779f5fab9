//! Document capability interface
//!
//! Extraction code reads documents through the [`Document`] trait and does
//! not care whether the markup came from a static fetch or from a live page.
//!
//! - [`HtmlDocument`] wraps markup parsed once (cached or fetched HTML)
//! - [`PageDocument`] wraps a snapshot of a live [`Page`] and can be
//!   refreshed after interacting with it
//!
//! Query results are owned [`Element`] values so they can outlive the parsed
//! tree and cross await points.

use crate::driver::{DriverResult, Page};
use crate::{HarvestError, Result};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// How raw content is turned into a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserEngine {
    /// Full document parsing, adding missing `html`/`body` wrappers
    #[default]
    Document,

    /// Fragment parsing; more forgiving with truncated or partial markup
    Fragment,
}

/// An element captured from a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Outer HTML of the element
    pub html: String,

    /// Concatenated text of the element and its descendants
    pub text: String,

    /// Attributes in document order
    pub attrs: Vec<(String, String)>,
}

impl Element {
    fn capture(element: ElementRef<'_>) -> Self {
        Self {
            html: element.html(),
            text: element.text().collect(),
            attrs: element
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Whitespace-normalized text
    pub fn text(&self) -> String {
        self.text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Runs `selector` against the descendants of this element
    pub fn select(&self, selector: &str) -> Result<Vec<Element>> {
        let selector = compile(selector)?;
        let fragment = Html::parse_fragment(&self.html);
        Ok(fragment.select(&selector).map(Element::capture).collect())
    }
}

/// Read access to a parsed document
pub trait Document {
    /// URL the document was loaded from
    fn url(&self) -> &str;

    /// All elements matching a CSS selector, in document order
    fn query(&self, selector: &str) -> Result<Vec<Element>>;

    /// First element matching `selector`, or `NotFound`
    fn query_one(&self, selector: &str) -> Result<Element> {
        self.query(selector)?
            .into_iter()
            .next()
            .ok_or_else(|| HarvestError::not_found(format!("'{}'", selector), self.url()))
    }

    fn text_of(&self, element: &Element) -> String {
        element.text()
    }

    fn attribute_of(&self, element: &Element, name: &str) -> Option<String> {
        element.attr(name).map(str::to_string)
    }
}

/// A statically parsed document
#[derive(Debug)]
pub struct HtmlDocument {
    url: String,
    html: Html,
}

impl HtmlDocument {
    pub fn html(&self) -> &Html {
        &self.html
    }
}

impl Document for HtmlDocument {
    fn url(&self) -> &str {
        &self.url
    }

    fn query(&self, selector: &str) -> Result<Vec<Element>> {
        let selector = compile(selector)?;
        Ok(self.html.select(&selector).map(Element::capture).collect())
    }
}

/// Parses raw content into a document
///
/// Content is decoded as UTF-8 (invalid sequences are replaced). Content
/// without any markup fails with `ParseFailure`; callers typically re-fetch
/// and retry with [`ParserEngine::Fragment`].
///
/// # Arguments
///
/// * `url` - Where the content came from, kept for error messages
/// * `content` - Raw bytes
/// * `engine` - Parsing mode
pub fn parse(url: &str, content: &[u8], engine: ParserEngine) -> Result<HtmlDocument> {
    let text = String::from_utf8_lossy(content);
    if !text.contains('<') {
        return Err(HarvestError::parse_failure(
            url,
            format!("no markup in {} bytes of content", content.len()),
        ));
    }

    let html = match engine {
        ParserEngine::Document => Html::parse_document(&text),
        ParserEngine::Fragment => Html::parse_fragment(&text),
    };

    Ok(HtmlDocument {
        url: url.to_string(),
        html,
    })
}

/// A snapshot of a live page
///
/// The snapshot is re-parsed for each query, so the value stays `Send` and
/// can be held while awaiting page interactions.
pub struct PageDocument {
    url: String,
    snapshot: String,
}

impl PageDocument {
    /// Captures the current content of `page`
    pub async fn capture(url: &str, page: &dyn Page) -> DriverResult<Self> {
        Ok(Self {
            url: url.to_string(),
            snapshot: page.content().await?,
        })
    }

    /// Re-reads the page content, e.g. after a focus or scroll
    pub async fn refresh(&mut self, page: &dyn Page) -> DriverResult<()> {
        self.snapshot = page.content().await?;
        Ok(())
    }

    pub fn snapshot(&self) -> &str {
        &self.snapshot
    }
}

impl Document for PageDocument {
    fn url(&self) -> &str {
        &self.url
    }

    fn query(&self, selector: &str) -> Result<Vec<Element>> {
        let selector = compile(selector)?;
        let html = Html::parse_document(&self.snapshot);
        let found = html.select(&selector).map(Element::capture).collect();
        Ok(found)
    }
}

fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| HarvestError::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// Resolves an href against `base`, keeping only http(s) targets
///
/// Returns None for empty hrefs, fragment-only links, `javascript:`,
/// `mailto:`, `tel:` and `data:` links, and anything that does not resolve.
pub fn resolve_link(href: &str, base: &str) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let base = Url::parse(base).ok()?;
    match base.join(href) {
        Ok(absolute) if absolute.scheme() == "http" || absolute.scheme() == "https" => {
            Some(absolute.to_string())
        }
        _ => None,
    }
}
