//! Stage graph from keywords to quizzes.
//!
//! ```text
//! keywords -> collection -> analysis -> persistence
//!                                          |
//!                                  RealNewsCreated
//!                                   /           \
//!                        detail quizzes       fake news
//!                         (quiz pool)        (news pool)
//!                                                |
//!                                        FakeNewsCreated
//!                                                |
//!                                          fact quizzes
//!                                          (quiz pool)
//!
//! select today -> TodayNewsCreated -> daily quizzes (daily pool)
//! ```
//!
//! [`NewsGenerationService`] runs the synchronous head of the graph and
//! publishes `RealNewsCreated` once the batch is committed. The
//! [`EventPipeline`] dispatcher turns every event into listener jobs on the
//! matching pool. Listener failures are logged there and go no further.

use crate::analysis::NewsAnalysisService;
use crate::collection::NewsCollectionService;
use crate::events::{DomainEvent, Envelope, EventPublisher};
use crate::fake_news::FakeNewsService;
use crate::models::CategorizedKeyword;
use crate::quiz::daily::{DailyOutcome, DailyQuizGenerator};
use crate::quiz::detail::DetailQuizGenerator;
use crate::quiz::fact::FactQuizGenerator;
use crate::store::NewsStore;
use crate::workers::{Pools, Submission, WorkerPool};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Counts from one collection-to-persistence run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub date: Option<NaiveDate>,
    pub keywords: Vec<String>,
    pub failed_keywords: Vec<String>,
    pub fetched: usize,
    pub duplicates: usize,
    pub known_skipped: usize,
    pub crawl_failures: usize,
    pub crawled: usize,
    pub analyzed: usize,
    pub selected: usize,
    pub persisted: Vec<u64>,
}

pub struct NewsGenerationService {
    collection: NewsCollectionService,
    analysis: NewsAnalysisService,
    store: Arc<NewsStore>,
    publisher: EventPublisher,
    max_selected: usize,
}

impl NewsGenerationService {
    pub fn new(
        collection: NewsCollectionService,
        analysis: NewsAnalysisService,
        store: Arc<NewsStore>,
        publisher: EventPublisher,
        max_selected: usize,
    ) -> Self {
        Self {
            collection,
            analysis,
            store,
            publisher,
            max_selected,
        }
    }

    /// Collect, analyse and persist news for `keywords`.
    ///
    /// `RealNewsCreated` is published only after the batch is committed, and
    /// only when something new was stored.
    #[instrument(level = "info", skip_all, fields(keywords = keywords.len(), %date))]
    pub async fn run(&self, keywords: &[CategorizedKeyword], date: NaiveDate) -> RunReport {
        let known = self.store.known_urls();
        let collected = self.collection.collect(keywords, &known).await;
        let crawled = collected.candidates.len();
        let outcome = self
            .analysis
            .analyze(collected.candidates, self.max_selected)
            .await;
        let selected = outcome.selected.len();

        let persisted: Vec<u64> = self
            .store
            .insert_real_news(outcome.selected, Utc::now())
            .into_iter()
            .map(|n| n.id)
            .collect();
        if !persisted.is_empty() {
            self.publisher.publish(DomainEvent::RealNewsCreated {
                ids: persisted.clone(),
            });
        }

        let report = RunReport {
            date: Some(date),
            keywords: keywords.iter().map(|k| k.keyword.keyword.clone()).collect(),
            failed_keywords: collected.failed_keywords,
            fetched: collected.fetched,
            duplicates: collected.duplicates,
            known_skipped: collected.known_skipped,
            crawl_failures: collected.crawl_failures,
            crawled,
            analyzed: outcome.scored,
            selected,
            persisted,
        };
        info!(
            fetched = report.fetched,
            duplicates = report.duplicates,
            crawl_failures = report.crawl_failures,
            analyzed = report.analyzed,
            selected = report.selected,
            persisted = report.persisted.len(),
            "News generation run finished"
        );
        report
    }
}

/// The services that react to committed-state events.
pub struct Listeners {
    pub detail: Arc<DetailQuizGenerator>,
    pub fake_news: Arc<FakeNewsService>,
    pub fact: Arc<FactQuizGenerator>,
    pub daily: Arc<DailyQuizGenerator>,
}

pub struct EventPipeline {
    publisher: EventPublisher,
    listeners: Listeners,
    pools: Arc<Pools>,
}

impl EventPipeline {
    /// Start the dispatcher. It holds a publisher itself, so it runs until
    /// the returned handle is aborted.
    pub fn spawn(
        rx: mpsc::UnboundedReceiver<Envelope>,
        publisher: EventPublisher,
        listeners: Listeners,
        pools: Arc<Pools>,
    ) -> JoinHandle<()> {
        let pipeline = EventPipeline {
            publisher,
            listeners,
            pools,
        };
        tokio::spawn(pipeline.dispatch(rx))
    }

    async fn dispatch(self, mut rx: mpsc::UnboundedReceiver<Envelope>) {
        info!("Event dispatcher started");
        while let Some(Envelope { event, guard }) = rx.recv().await {
            debug!(kind = event.kind(), "Dispatching event");
            match event {
                DomainEvent::RealNewsCreated { ids } => self.on_real_news_created(ids).await,
                DomainEvent::FakeNewsCreated { ids } => self.on_fake_news_created(ids).await,
                DomainEvent::TodayNewsCreated { id } => self.on_today_news_created(id).await,
            }
            drop(guard);
        }
        info!("Event dispatcher stopped");
    }

    async fn on_real_news_created(&self, ids: Vec<u64>) {
        if ids.is_empty() {
            return;
        }
        let detail = Arc::clone(&self.listeners.detail);
        let detail_ids = ids.clone();
        self.run_listener(&self.pools.quiz, "detail_quiz", async move {
            if let Err(e) = detail.generate_for(&detail_ids).await {
                error!(ids = ?detail_ids, error = %e, "Detail quiz generation failed");
            }
        })
        .await;

        let fake_news = Arc::clone(&self.listeners.fake_news);
        self.run_listener(&self.pools.news, "fake_news", async move {
            let report = fake_news.generate_for(&ids).await;
            if !report.failed.is_empty() {
                warn!(failed = ?report.failed, "Fake news left missing for some items");
            }
        })
        .await;
    }

    async fn on_fake_news_created(&self, ids: Vec<u64>) {
        if ids.is_empty() {
            debug!("FakeNewsCreated without ids; ignoring");
            return;
        }
        let fact = Arc::clone(&self.listeners.fact);
        self.run_listener(&self.pools.quiz, "fact_quiz", async move {
            if let Err(e) = fact.generate_for(&ids).await {
                error!(ids = ?ids, error = %e, "Fact quiz generation failed");
            }
        })
        .await;
    }

    async fn on_today_news_created(&self, id: u64) {
        let daily = Arc::clone(&self.listeners.daily);
        self.run_listener(&self.pools.daily, "daily_quiz", async move {
            match daily.generate(id).await {
                Ok(DailyOutcome::Created { quizzes }) => debug!(id, quizzes, "Daily quiz listener done"),
                Ok(_) => {}
                Err(e) => error!(id, error = %e, "Daily quiz generation failed"),
            }
        })
        .await;
    }

    /// Submit a listener job, counted by the publisher until it finishes.
    async fn run_listener<F>(&self, pool: &WorkerPool, listener: &'static str, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let tracked = self.publisher.track();
        let submission = pool
            .submit(async move {
                let _tracked = tracked;
                job.await;
            })
            .await;
        if submission == Submission::Rejected {
            warn!(pool = pool.name(), listener, "Listener job rejected");
        }
    }
}
