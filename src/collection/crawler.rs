//! Best-effort article scraper for origin news pages.
//!
//! Korean outlets have no shared markup, so the body is taken from the first
//! selector in [`CONTENT_SELECTORS`] that yields enough text, falling back to
//! every `<p>` on the page. Image and outlet come from OpenGraph tags; the
//! journalist from byline meta tags or common byline classes.

use super::ArticleCrawler;
use crate::config::CollectionConfig;
use crate::error::CollectionError;
use crate::models::NewsDetail;
use crate::utils::clean_text;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// Content shorter than this is treated as a failed scrape.
const MIN_CONTENT_CHARS: usize = 50;

const CONTENT_SELECTORS: &[&str] = &[
    "#dic_area",
    "#articleBodyContents",
    "#newsct_article",
    "#article-view-content-div",
    "#articleBody",
    ".article_body",
    ".article-body",
    "article",
];

const JOURNALIST_SELECTORS: &[&str] = &[
    ".media_end_head_journalist_name",
    ".byline_s",
    ".byline",
    ".journalist",
    ".reporter",
];

fn selector(s: &str) -> Selector {
    Selector::parse(s).expect("static selector")
}

static CONTENT: Lazy<Vec<Selector>> = Lazy::new(|| CONTENT_SELECTORS.iter().map(|s| selector(s)).collect());
static JOURNALIST: Lazy<Vec<Selector>> =
    Lazy::new(|| JOURNALIST_SELECTORS.iter().map(|s| selector(s)).collect());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| selector("p"));
static OG_IMAGE: Lazy<Selector> = Lazy::new(|| selector(r#"meta[property="og:image"]"#));
static OG_SITE_NAME: Lazy<Selector> = Lazy::new(|| selector(r#"meta[property="og:site_name"]"#));
static META_AUTHOR: Lazy<Selector> =
    Lazy::new(|| selector(r#"meta[name="author"], meta[property="article:author"], meta[property="dable:author"]"#));

/// Visible text of an element, skipping script and style contents.
fn visible_text(element: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let in_code = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|el| matches!(el.value().name(), "script" | "style" | "noscript"));
        if !in_code {
            parts.push(&**text);
        }
    }
    clean_text(&parts.join(" "))
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .filter_map(|el| el.value().attr("content"))
        .map(clean_text)
        .find(|s| !s.is_empty())
}

/// Extract a [`NewsDetail`] from a fetched page.
pub fn parse_article(html: &str, url: &str) -> Result<NewsDetail, CollectionError> {
    let document = Html::parse_document(html);

    let content = CONTENT
        .iter()
        .filter_map(|sel| document.select(sel).next())
        .map(visible_text)
        .find(|text| text.chars().count() >= MIN_CONTENT_CHARS)
        .or_else(|| {
            let joined = document
                .select(&PARAGRAPH)
                .map(visible_text)
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            (joined.chars().count() >= MIN_CONTENT_CHARS).then_some(joined)
        })
        .ok_or_else(|| CollectionError::ScrapeFailed {
            url: url.to_string(),
            reason: "no article body found".into(),
        })?;

    let image_url = meta_content(&document, &OG_IMAGE)
        .and_then(|src| url::Url::parse(url).ok()?.join(&src).ok())
        .map(|u| u.to_string());
    let media_name = meta_content(&document, &OG_SITE_NAME);
    let journalist = meta_content(&document, &META_AUTHOR).or_else(|| {
        JOURNALIST
            .iter()
            .filter_map(|sel| document.select(sel).next())
            .map(visible_text)
            .find(|s| !s.is_empty())
    });

    debug!(
        %url,
        chars = content.chars().count(),
        has_image = image_url.is_some(),
        media = ?media_name,
        "Parsed article"
    );
    Ok(NewsDetail {
        content,
        image_url,
        journalist,
        media_name,
    })
}

pub struct HtmlArticleCrawler {
    http: reqwest::Client,
}

impl std::fmt::Debug for HtmlArticleCrawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HtmlArticleCrawler").finish()
    }
}

impl HtmlArticleCrawler {
    pub fn new(config: &CollectionConfig) -> Result<Self, CollectionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ArticleCrawler for HtmlArticleCrawler {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn crawl(&self, url: &str) -> Result<NewsDetail, CollectionError> {
        let t0 = Instant::now();
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CollectionError::ScrapeFailed {
                url: url.to_string(),
                reason: format!("status {}", status.as_u16()),
            });
        }
        let body = response.text().await?;
        let detail = parse_article(&body, url)?;
        info!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Crawled article"
        );
        Ok(detail)
    }
}
