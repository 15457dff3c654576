//! Wiring and the operations exposed to callers.
//!
//! [`App::new`] builds every service once, starts the event dispatcher, and
//! hands each component the pool or publisher it needs. Nothing is looked up
//! globally. Must be called inside a Tokio runtime.

use crate::analysis::{HeuristicScorer, LlmScorer, NewsAnalysisService, NewsScorer};
use crate::api::{Generator, OpenAiCompatibleClient, RetryGenerator};
use crate::collection::crawler::HtmlArticleCrawler;
use crate::collection::naver::NaverNewsClient;
use crate::collection::{ArticleCrawler, NewsCollectionService, NewsSearch};
use crate::config::{PipelineConfig, ScorerKind};
use crate::error::PipelineError;
use crate::events::{DomainEvent, EventPublisher};
use crate::fake_news::FakeNewsService;
use crate::keywords::days_before;
use crate::keywords::history::KeywordHistoryStore;
use crate::keywords::KeywordGenerationService;
use crate::models::{CategorizedKeyword, TodayNews};
use crate::pipeline::{EventPipeline, Listeners, NewsGenerationService, RunReport};
use crate::quiz::daily::DailyQuizGenerator;
use crate::quiz::detail::DetailQuizGenerator;
use crate::quiz::fact::FactQuizGenerator;
use crate::rate_limiter::RateLimiter;
use crate::store::{MissingGeneration, NewsStore, TodaySelection};
use crate::workers::{Pools, Submission};
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// The external capabilities the pipeline consumes.
pub struct Collaborators {
    pub search: Arc<dyn NewsSearch>,
    pub crawler: Arc<dyn ArticleCrawler>,
    pub generator: Arc<dyn Generator>,
}

impl Collaborators {
    /// Naver search, the HTML crawler, and the OpenAI-compatible client with retry.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let search = NaverNewsClient::new(
            config.naver.clone(),
            Duration::from_secs(config.collection.request_timeout_secs),
        )?;
        let crawler = HtmlArticleCrawler::new(&config.collection)?;
        let client = OpenAiCompatibleClient::new(&config.llm)?;
        Ok(Self {
            search: Arc::new(search),
            crawler: Arc::new(crawler),
            generator: Arc::new(RetryGenerator::from_config(client, &config.llm)),
        })
    }
}

pub struct App {
    config: PipelineConfig,
    store: Arc<NewsStore>,
    history: Arc<KeywordHistoryStore>,
    keywords: KeywordGenerationService,
    news: Arc<NewsGenerationService>,
    publisher: EventPublisher,
    pools: Arc<Pools>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl App {
    pub fn new(
        config: PipelineConfig,
        collaborators: Collaborators,
        store: Arc<NewsStore>,
        history: Arc<KeywordHistoryStore>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let Collaborators {
            search,
            crawler,
            generator,
        } = collaborators;

        let (publisher, rx) = EventPublisher::channel();
        let pools = Arc::new(Pools::new(&config.pools));
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit)?);

        let keywords = KeywordGenerationService::new(
            Arc::clone(&generator),
            Arc::clone(&history),
            config.keywords.clone(),
        );

        let scorer: Arc<dyn NewsScorer> = match config.analysis.scorer {
            ScorerKind::Heuristic => Arc::new(HeuristicScorer::new(config.analysis.min_content_chars)),
            ScorerKind::Llm => Arc::new(LlmScorer::new(Arc::clone(&generator))),
        };
        let news = Arc::new(NewsGenerationService::new(
            NewsCollectionService::new(search, crawler, limiter, config.collection.crawl_concurrency),
            NewsAnalysisService::new(scorer, config.analysis.min_score, config.quiz.generation_concurrency),
            Arc::clone(&store),
            publisher.clone(),
            config.analysis.max_selected,
        ));

        let concurrency = config.quiz.generation_concurrency;
        let listeners = Listeners {
            detail: Arc::new(DetailQuizGenerator::new(
                Arc::clone(&store),
                Arc::clone(&generator),
                config.quiz.detail_per_news,
                concurrency,
            )),
            fake_news: Arc::new(FakeNewsService::new(
                Arc::clone(&store),
                Arc::clone(&generator),
                publisher.clone(),
                concurrency,
            )),
            fact: Arc::new(FactQuizGenerator::new(
                Arc::clone(&store),
                Arc::clone(&generator),
                config.quiz.detail_per_news,
                concurrency,
            )),
            daily: Arc::new(DailyQuizGenerator::new(Arc::clone(&store), config.quiz.daily_count)),
        };
        let dispatcher = EventPipeline::spawn(rx, publisher.clone(), listeners, Arc::clone(&pools));

        Ok(Self {
            config,
            store,
            history,
            keywords,
            news,
            publisher,
            pools,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<NewsStore> {
        &self.store
    }

    pub fn history(&self) -> &Arc<KeywordHistoryStore> {
        &self.history
    }

    /// Collection, analysis and persistence for `keywords` on the news pool.
    #[instrument(level = "info", skip_all, fields(keywords = keywords.len(), %date))]
    pub async fn run_for_keywords(
        &self,
        keywords: Vec<CategorizedKeyword>,
        date: NaiveDate,
    ) -> Result<RunReport, PipelineError> {
        let (tx, rx) = oneshot::channel();
        let news = Arc::clone(&self.news);
        let submission = self
            .pools
            .news
            .submit(async move {
                let report = news.run(&keywords, date).await;
                let _ = tx.send(report);
            })
            .await;
        if submission == Submission::Rejected {
            return Err(PipelineError::JobLost(self.pools.news.name()));
        }
        rx.await
            .map_err(|_| PipelineError::JobLost(self.pools.news.name()))
    }

    /// Generate the day's keywords, then run collection for them.
    #[instrument(level = "info", skip_all, fields(%date, exclusions = exclusions.len()))]
    pub async fn run_scheduled(
        &self,
        date: NaiveDate,
        exclusions: &[String],
    ) -> Result<RunReport, PipelineError> {
        let generated = self.keywords.generate(date, exclusions).await?;
        if generated.is_empty() {
            warn!("No keywords survived filtering; nothing to collect");
            return Ok(RunReport {
                date: Some(date),
                ..RunReport::default()
            });
        }
        self.run_for_keywords(generated.flatten(), date).await
    }

    /// Designate `real_news_id` as the news of `date` and trigger its daily quizzes.
    #[instrument(level = "info", skip(self))]
    pub fn select_today(
        &self,
        real_news_id: u64,
        date: NaiveDate,
    ) -> Result<TodaySelection, PipelineError> {
        let selection = self.store.select_today_news(real_news_id, date)?;
        self.publisher
            .publish(DomainEvent::TodayNewsCreated { id: real_news_id });
        Ok(selection)
    }

    pub fn today_news_id(&self, date: NaiveDate) -> Option<u64> {
        self.store.today_news_on(date).map(|t| t.id)
    }

    pub fn latest_today_news(&self) -> Option<TodayNews> {
        self.store.latest_today_news()
    }

    pub fn prune_keyword_history(&self, cutoff: NaiveDate) -> usize {
        self.history.prune_before(cutoff)
    }

    /// Cutoff for [`App::prune_keyword_history`] from the configured retention.
    pub fn retention_cutoff(&self, today: NaiveDate) -> NaiveDate {
        days_before(today, self.config.keywords.retention_days)
    }

    /// Re-trigger generation for every RealNews still missing fake news or a quiz set.
    ///
    /// Publishes one `RealNewsCreated` for the affected ids. Listeners skip
    /// whatever already exists, and fake news that is present is passed on so
    /// its fact quizzes are retried too.
    #[instrument(level = "info", skip(self))]
    pub fn regenerate_missing(&self) -> MissingGeneration {
        let missing = self.store.missing_generation();
        if missing.is_empty() {
            info!("Nothing left to regenerate");
            return missing;
        }
        let ids = missing.ids();
        info!(
            ids = ids.len(),
            fake_news = missing.fake_news.len(),
            detail_quizzes = missing.detail_quizzes.len(),
            fact_quizzes = missing.fact_quizzes.len(),
            "Re-triggering missing generation"
        );
        self.publisher.publish(DomainEvent::RealNewsCreated { ids });
        missing
    }

    /// Wait up to `timeout` for every published event and its jobs to finish.
    pub async fn settle(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.publisher.settled())
            .await
            .is_ok()
    }

    /// Let the cascade settle, drain the pools, and stop the dispatcher.
    ///
    /// Returns `false` when the grace period ran out and work was abandoned.
    pub async fn shutdown(&self) -> bool {
        let grace = self.config.pools.shutdown_grace();
        let settled = self.settle(grace).await;
        if !settled {
            warn!(pending = self.publisher.pending(), "Events still pending at shutdown");
        }
        let drained = self.pools.shutdown(grace).await;
        if let Some(handle) = self.dispatcher.lock().take() {
            handle.abort();
        }
        info!(settled, drained, "Pipeline shut down");
        settled && drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PoolsConfig, RateLimitConfig};
    use crate::api::GenerationTask;
    use crate::error::GenerationError;
    use crate::testing::{ai_keyword, canned_answer, hit, FnGenerator, ScriptedCrawler, StaticSearch};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.rate_limit = RateLimitConfig {
            poll_interval_ms: 10,
            max_wait_secs: 1,
            ..RateLimitConfig::default()
        };
        config.analysis.max_selected = 3;
        config.pools = PoolsConfig {
            shutdown_grace_secs: 5,
            ..PoolsConfig::default()
        };
        config
    }

    fn app(search: StaticSearch, crawler: Arc<ScriptedCrawler>) -> App {
        App::new(
            config(),
            Collaborators {
                search: Arc::new(search),
                crawler,
                generator: Arc::new(FnGenerator::canned()),
            },
            Arc::new(NewsStore::new()),
            Arc::new(KeywordHistoryStore::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_single_keyword() {
        // Five raw hits, one sharing a link with another.
        let mut dup = hit(5);
        dup.link = hit(2).link;
        let search = StaticSearch::new().with("AI", vec![hit(1), hit(2), hit(3), hit(4), dup]);
        let crawler = Arc::new(ScriptedCrawler::new().failing(&hit(4).original_link));
        let app = app(search, crawler.clone());

        let report = app.run_for_keywords(vec![ai_keyword()], date(18)).await.unwrap();
        assert!(app.settle(Duration::from_secs(5)).await);

        assert_eq!(report.fetched, 5);
        assert_eq!(report.duplicates, 1);
        assert_eq!(crawler.crawled().len(), 4);
        assert_eq!(report.crawled, 3);
        assert_eq!(report.selected, 3);
        assert_eq!(report.persisted.len(), 3);

        let store = app.store();
        assert_eq!(store.real_news_count(), 3);
        assert_eq!(store.fake_news_count(), 3);
        for id in &report.persisted {
            assert!(store.fake_news(*id).is_some());
            assert_eq!(store.detail_quizzes_for(*id).len(), 3);
            assert_eq!(store.fact_quizzes_for(*id).len(), 3);
        }
        assert!(app.shutdown().await);
    }

    #[tokio::test]
    async fn test_rerun_skips_known_articles() {
        let search = StaticSearch::new().with("AI", vec![hit(1), hit(2)]);
        let crawler = Arc::new(ScriptedCrawler::new());
        let app = app(search, crawler.clone());

        app.run_for_keywords(vec![ai_keyword()], date(18)).await.unwrap();
        let again = app.run_for_keywords(vec![ai_keyword()], date(18)).await.unwrap();
        assert!(app.settle(Duration::from_secs(5)).await);

        assert_eq!(again.known_skipped, 2);
        assert!(again.persisted.is_empty());
        assert_eq!(crawler.crawled().len(), 2);
        assert_eq!(app.store().real_news_count(), 2);
        assert_eq!(app.store().fake_news_count(), 2);
    }

    #[tokio::test]
    async fn test_scheduled_run_uses_generated_keywords() {
        let search = StaticSearch::new().with("AI", vec![hit(1)]).with("Flood", vec![hit(2)]);
        let app = app(search, Arc::new(ScriptedCrawler::new()));

        let report = app.run_scheduled(date(18), &["flood".into()]).await.unwrap();
        assert_eq!(report.keywords, vec!["AI".to_string()]);
        assert_eq!(report.persisted.len(), 1);
        assert_eq!(app.history().len(), 1);
        assert!(app.shutdown().await);
    }

    #[tokio::test]
    async fn test_regenerate_fills_in_failed_detail_quizzes() {
        let detail_calls = Arc::new(AtomicUsize::new(0));
        let fake_calls = Arc::new(AtomicUsize::new(0));
        let generator = {
            let (detail_calls, fake_calls) = (Arc::clone(&detail_calls), Arc::clone(&fake_calls));
            FnGenerator::new(move |prompt| match prompt.task {
                GenerationTask::DetailQuiz if detail_calls.fetch_add(1, Ordering::SeqCst) == 0 => {
                    Err(GenerationError::Unavailable("model overloaded".into()))
                }
                GenerationTask::FakeNews => {
                    fake_calls.fetch_add(1, Ordering::SeqCst);
                    canned_answer(prompt)
                }
                _ => canned_answer(prompt),
            })
        };
        let app = App::new(
            config(),
            Collaborators {
                search: Arc::new(StaticSearch::new().with("AI", vec![hit(1)])),
                crawler: Arc::new(ScriptedCrawler::new()),
                generator: Arc::new(generator),
            },
            Arc::new(NewsStore::new()),
            Arc::new(KeywordHistoryStore::new()),
        )
        .unwrap();

        let report = app.run_for_keywords(vec![ai_keyword()], date(18)).await.unwrap();
        assert!(app.settle(Duration::from_secs(5)).await);
        let id = report.persisted[0];
        assert!(!app.store().has_detail_quizzes(id));
        assert!(app.store().has_fact_quizzes(id));

        // Collecting again cannot help: the article is already known.
        let again = app.run_for_keywords(vec![ai_keyword()], date(18)).await.unwrap();
        assert!(again.persisted.is_empty());

        let missing = app.regenerate_missing();
        assert_eq!(missing.detail_quizzes, vec![id]);
        assert!(missing.fake_news.is_empty());
        assert!(app.settle(Duration::from_secs(5)).await);

        assert_eq!(app.store().detail_quizzes_for(id).len(), 3);
        assert_eq!(app.store().fact_quizzes_for(id).len(), 3);
        assert_eq!(detail_calls.load(Ordering::SeqCst), 2);
        assert_eq!(fake_calls.load(Ordering::SeqCst), 1);
        assert!(app.regenerate_missing().is_empty());
        assert!(app.shutdown().await);
    }

    #[tokio::test]
    async fn test_select_today_supersedes_and_builds_daily_quizzes() {
        let search = StaticSearch::new().with("AI", vec![hit(1), hit(2)]);
        let app = app(search, Arc::new(ScriptedCrawler::new()));
        let report = app.run_for_keywords(vec![ai_keyword()], date(18)).await.unwrap();
        assert!(app.settle(Duration::from_secs(5)).await);
        let (a, b) = (report.persisted[0], report.persisted[1]);

        app.select_today(a, date(18)).unwrap();
        assert!(app.settle(Duration::from_secs(5)).await);
        assert_eq!(app.store().daily_quizzes_for(a).len(), 3);

        let selection = app.select_today(b, date(18)).unwrap();
        assert!(app.settle(Duration::from_secs(5)).await);
        assert_eq!(selection.superseded, vec![a]);
        assert_eq!(app.today_news_id(date(18)), Some(b));
        assert_eq!(app.store().today_news_count_on(date(18)), 1);
        assert!(app.store().daily_quizzes_for(a).is_empty());
        assert_eq!(app.store().daily_quizzes_for(b).len(), 3);
        assert_eq!(app.latest_today_news().map(|t| t.id), Some(b));

        assert!(matches!(
            app.select_today(999, date(19)),
            Err(PipelineError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_prune_uses_retention_cutoff() {
        let app = app(StaticSearch::new(), Arc::new(ScriptedCrawler::new()));
        let kw = ai_keyword();
        app.history().record(&kw.keyword, kw.category, date(1), chrono::Utc::now());
        app.history().record(&kw.keyword, kw.category, date(18), chrono::Utc::now());
        let cutoff = app.retention_cutoff(NaiveDate::from_ymd_opt(2026, 11, 10).unwrap());
        assert_eq!(cutoff, date(11));
        assert_eq!(app.prune_keyword_history(cutoff), 1);
    }

    #[tokio::test]
    async fn test_run_after_shutdown_is_rejected() {
        let app = app(StaticSearch::new(), Arc::new(ScriptedCrawler::new()));
        assert!(app.shutdown().await);
        assert!(matches!(
            app.run_for_keywords(vec![ai_keyword()], date(18)).await,
            Err(PipelineError::JobLost("news-generation"))
        ));
    }
}
