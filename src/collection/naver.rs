//! Naver news search API adapter.
//!
//! `GET {base_url}?query=..&display=..&start=1&sort=..` authenticated with the
//! `X-Naver-Client-Id` / `X-Naver-Client-Secret` header pair. Text fields
//! come back with `<b>` highlighting, HTML entities and the occasional
//! literal `\uXXXX` escape, so every field goes through [`clean_text`].

use super::NewsSearch;
use crate::config::NaverConfig;
use crate::error::CollectionError;
use crate::models::NaverNewsDto;
use crate::utils::{clean_text, truncate_for_log};
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<RawItem>,
}

/// Item as sent on the wire; every field may be absent.
#[derive(Debug, Deserialize)]
struct RawItem {
    title: Option<String>,
    #[serde(rename = "originallink")]
    original_link: Option<String>,
    link: Option<String>,
    description: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

impl RawItem {
    /// Clean every field; `None` when a required one is missing or blank.
    fn into_dto(self) -> Option<NaverNewsDto> {
        let field = |v: Option<String>| v.map(|s| clean_text(&s)).filter(|s| !s.is_empty());
        let pub_date = self
            .pub_date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())?;
        Some(NaverNewsDto {
            title: field(self.title)?,
            original_link: field(self.original_link)?,
            link: field(self.link)?,
            description: field(self.description)?,
            pub_date,
        })
    }
}

/// Parse a search response body, dropping incomplete items.
pub fn parse_search_response(body: &str) -> Result<Vec<NaverNewsDto>, CollectionError> {
    let response: SearchResponse = serde_json::from_str(body)?;
    let total = response.items.len();
    let items: Vec<NaverNewsDto> = response
        .items
        .into_iter()
        .filter_map(|raw| {
            let link = raw.link.clone();
            let dto = raw.into_dto();
            if dto.is_none() {
                debug!(link = ?link, "Dropping search item with missing or blank field");
            }
            dto
        })
        .collect();
    if items.len() < total {
        info!(total, kept = items.len(), "Dropped incomplete search items");
    }
    Ok(items)
}

pub struct NaverNewsClient {
    http: reqwest::Client,
    config: NaverConfig,
}

impl std::fmt::Debug for NaverNewsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NaverNewsClient")
            .field("base_url", &self.config.base_url)
            .field("display", &self.config.display)
            .finish()
    }
}

impl NaverNewsClient {
    pub fn new(config: NaverConfig, timeout: Duration) -> Result<Self, CollectionError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, config })
    }

    fn search_url(&self, keyword: &str) -> String {
        format!(
            "{}?query={}&display={}&start=1&sort={}",
            self.config.base_url,
            urlencoding::encode(keyword),
            self.config.display,
            self.config.sort.as_str()
        )
    }
}

#[async_trait]
impl NewsSearch for NaverNewsClient {
    #[instrument(level = "info", skip_all, fields(%keyword))]
    async fn search(&self, keyword: &str) -> Result<Vec<NaverNewsDto>, CollectionError> {
        let t0 = Instant::now();
        let mut request = self.http.get(self.search_url(keyword));
        if let Some(id) = &self.config.client_id {
            request = request.header("X-Naver-Client-Id", id);
        }
        if let Some(secret) = &self.config.client_secret {
            request = request.header("X-Naver-Client-Secret", secret);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), body = %truncate_for_log(&body, 300), "News search failed");
            return Err(CollectionError::Api {
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }

        let items = parse_search_response(&body)?;
        info!(
            count = items.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "News search returned"
        );
        Ok(items)
    }
}
