//! Keyword search, deduplication, and origin-page crawling.
//!
//! Collection runs in three phases:
//!
//! 1. **Search**: each keyword is sent to the [`NewsSearch`] backend behind
//!    the shared [`RateLimiter`]. A keyword whose search fails (rate-limit
//!    timeout, API error, unparsable body) contributes nothing.
//! 2. **Dedup**: hits are collapsed by `link` and `original_link` across the
//!    whole run, and hits already persisted are skipped, so no origin is
//!    crawled twice.
//! 3. **Crawl**: every survivor's origin page is fetched with bounded
//!    concurrency. A failed crawl drops that hit only.

pub mod crawler;
pub mod naver;

use crate::error::CollectionError;
use crate::models::{CategorizedKeyword, NaverNewsDto, NewsCandidate, NewsDetail};
use crate::rate_limiter::RateLimiter;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Keyword in, cleaned search hits out.
#[async_trait]
pub trait NewsSearch: Send + Sync {
    async fn search(&self, keyword: &str) -> Result<Vec<NaverNewsDto>, CollectionError>;
}

/// Origin URL in, scraped article details out.
#[async_trait]
pub trait ArticleCrawler: Send + Sync {
    async fn crawl(&self, url: &str) -> Result<NewsDetail, CollectionError>;
}

/// What one collection run produced, plus the counts behind it.
#[derive(Debug, Default)]
pub struct CollectionReport {
    pub candidates: Vec<NewsCandidate>,
    pub fetched: usize,
    pub duplicates: usize,
    pub known_skipped: usize,
    pub crawl_failures: usize,
    pub failed_keywords: Vec<String>,
}

pub struct NewsCollectionService {
    search: Arc<dyn NewsSearch>,
    crawler: Arc<dyn ArticleCrawler>,
    limiter: Arc<RateLimiter>,
    crawl_concurrency: usize,
}

impl NewsCollectionService {
    pub fn new(
        search: Arc<dyn NewsSearch>,
        crawler: Arc<dyn ArticleCrawler>,
        limiter: Arc<RateLimiter>,
        crawl_concurrency: usize,
    ) -> Self {
        Self {
            search,
            crawler,
            limiter,
            crawl_concurrency: crawl_concurrency.max(1),
        }
    }

    /// Search every keyword, drop duplicates and `known` URLs, then crawl.
    #[instrument(level = "info", skip_all, fields(keywords = keywords.len(), known = known.len()))]
    pub async fn collect(
        &self,
        keywords: &[CategorizedKeyword],
        known: &HashSet<String>,
    ) -> CollectionReport {
        let mut report = CollectionReport::default();

        // Searches run one after another; the limiter is the only throttle
        // and ordering keeps keyword attribution deterministic.
        let mut hits: Vec<(NaverNewsDto, CategorizedKeyword)> = Vec::new();
        for keyword in keywords {
            match self.search_one(&keyword.keyword.keyword).await {
                Ok(found) => {
                    debug!(keyword = %keyword.keyword.keyword, count = found.len(), "Search hits");
                    hits.extend(found.into_iter().map(|hit| (hit, keyword.clone())));
                }
                Err(e) => {
                    warn!(keyword = %keyword.keyword.keyword, error = %e, "Search failed; skipping keyword");
                    report.failed_keywords.push(keyword.keyword.keyword.clone());
                }
            }
        }
        report.fetched = hits.len();

        let mut seen: HashSet<String> = HashSet::new();
        let mut unique = Vec::with_capacity(hits.len());
        for (hit, keyword) in hits {
            if known.contains(&hit.link) || known.contains(&hit.original_link) {
                debug!(link = %hit.link, "Already persisted; skipping");
                report.known_skipped += 1;
                continue;
            }
            if seen.contains(&hit.link) || seen.contains(&hit.original_link) {
                debug!(link = %hit.link, "Duplicate hit; skipping");
                report.duplicates += 1;
                continue;
            }
            seen.insert(hit.link.clone());
            seen.insert(hit.original_link.clone());
            unique.push((hit, keyword));
        }
        info!(
            fetched = report.fetched,
            unique = unique.len(),
            duplicates = report.duplicates,
            known_skipped = report.known_skipped,
            "Deduplicated search hits"
        );

        let crawled: Vec<Option<NewsCandidate>> = stream::iter(unique)
            .map(|(hit, keyword)| {
                let crawler = Arc::clone(&self.crawler);
                async move {
                    match crawler.crawl(&hit.original_link).await {
                        Ok(detail) => Some(NewsCandidate::from_parts(hit, detail, Some(keyword))),
                        Err(e) => {
                            warn!(link = %hit.link, url = %hit.original_link, error = %e, "Crawl failed; dropping item");
                            None
                        }
                    }
                }
            })
            .buffered(self.crawl_concurrency)
            .collect()
            .await;

        for candidate in crawled {
            match candidate {
                Some(c) => report.candidates.push(c),
                None => report.crawl_failures += 1,
            }
        }
        info!(
            candidates = report.candidates.len(),
            crawl_failures = report.crawl_failures,
            failed_keywords = report.failed_keywords.len(),
            "Collection finished"
        );
        report
    }

    async fn search_one(&self, keyword: &str) -> Result<Vec<NaverNewsDto>, CollectionError> {
        self.limiter.acquire().await?;
        self.search.search(keyword).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KeywordType, KeywordWithType, NewsCategory};
    use crate::testing::{hit, ScriptedCrawler, StaticSearch};
    use std::time::Duration;

    fn keyword(s: &str) -> CategorizedKeyword {
        CategorizedKeyword {
            keyword: KeywordWithType {
                keyword: s.into(),
                keyword_type: KeywordType::Breaking,
            },
            category: NewsCategory::It,
        }
    }

    fn limiter() -> Arc<RateLimiter> {
        Arc::new(
            RateLimiter::with_timing(
                12,
                Duration::from_secs(5),
                Duration::from_millis(10),
                Duration::from_millis(50),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_dedups_before_crawl_and_drops_crawl_failures() {
        // Hit 4 repeats hit 1's origin under a different link.
        let mut dup = hit(1);
        dup.link = "https://n.news.naver.com/article/dup".into();
        let search = StaticSearch::new().with("AI", vec![hit(1), hit(2), hit(3), hit(4), dup]);
        let crawler = Arc::new(ScriptedCrawler::new().failing(&hit(3).original_link));
        let service = NewsCollectionService::new(Arc::new(search), crawler.clone(), limiter(), 2);

        let report = service.collect(&[keyword("AI")], &HashSet::new()).await;

        assert_eq!(report.fetched, 5);
        assert_eq!(report.duplicates, 1);
        assert_eq!(crawler.crawled().len(), 4);
        assert_eq!(report.crawl_failures, 1);
        assert_eq!(report.candidates.len(), 3);

        let links: HashSet<_> = report.candidates.iter().map(|c| c.link.clone()).collect();
        let origins: HashSet<_> = report.candidates.iter().map(|c| c.original_url.clone()).collect();
        assert_eq!(links.len(), 3);
        assert_eq!(origins.len(), 3);
        assert!(report.candidates.iter().all(|c| c.keyword == Some(keyword("AI"))));
    }

    #[tokio::test]
    async fn test_dedups_across_keywords_and_skips_known() {
        let search = StaticSearch::new()
            .with("AI", vec![hit(1), hit(2)])
            .with("Chips", vec![hit(2), hit(3)]);
        let crawler = Arc::new(ScriptedCrawler::new());
        let service = NewsCollectionService::new(Arc::new(search), crawler.clone(), limiter(), 4);
        let known = HashSet::from([hit(3).link]);

        let report = service
            .collect(&[keyword("AI"), keyword("Chips")], &known)
            .await;

        assert_eq!(report.duplicates, 1);
        assert_eq!(report.known_skipped, 1);
        assert_eq!(report.candidates.len(), 2);
        assert_eq!(crawler.crawled().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_keyword_does_not_abort_run() {
        let search = StaticSearch::new().with("AI", vec![hit(1)]);
        let service = NewsCollectionService::new(
            Arc::new(search),
            Arc::new(ScriptedCrawler::new()),
            limiter(),
            1,
        );
        let report = service
            .collect(&[keyword("missing"), keyword("AI")], &HashSet::new())
            .await;
        assert_eq!(report.failed_keywords, vec!["missing".to_string()]);
        assert_eq!(report.candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_timeout_drops_keyword() {
        let limiter = Arc::new(
            RateLimiter::with_timing(
                1,
                Duration::from_secs(60),
                Duration::from_millis(5),
                Duration::from_millis(20),
            )
            .unwrap(),
        );
        let search = StaticSearch::new()
            .with("AI", vec![hit(1)])
            .with("Chips", vec![hit(2)]);
        let service =
            NewsCollectionService::new(Arc::new(search), Arc::new(ScriptedCrawler::new()), limiter, 1);
        let report = service
            .collect(&[keyword("AI"), keyword("Chips")], &HashSet::new())
            .await;
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.failed_keywords, vec!["Chips".to_string()]);
    }
}
