//! Synthetic counterparts for persisted real news.
//!
//! Existing FakeNews rows are found with one batched lookup before any
//! generation starts, so overlapping reruns never generate twice. Each item
//! is contained: a failed generation for one id is logged and the rest of
//! the batch carries on. When anything is (or already was) in place, a
//! [`DomainEvent::FakeNewsCreated`] is published so fact quizzes can follow.

use crate::api::{generate_json, GenerationTask, Generator, PromptSpec};
use crate::error::{GenerationError, StoreError};
use crate::events::{DomainEvent, EventPublisher};
use crate::models::{FakeNews, RealNews};
use crate::store::NewsStore;
use crate::utils::truncate_chars;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const FAKE_NEWS_SYSTEM_PROMPT: &str = r#"You rewrite news articles for a real-or-fake quiz.
Keep the topic, tone and length of the article, but change its factual details
(numbers, names, places, dates, outcomes) so that the rewrite is plausible yet
wrong. Do not mention that the text is altered.
Respond with a single JSON object: {"content":"..."}"#;

#[derive(Debug, Deserialize)]
struct FakeNewsResponse {
    content: String,
}

/// Per-batch outcome, by RealNews id.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FakeNewsReport {
    pub created: Vec<u64>,
    /// Already had a FakeNews row.
    pub skipped: Vec<u64>,
    pub failed: Vec<u64>,
    /// No RealNews row with this id.
    pub missing: Vec<u64>,
}

enum ItemOutcome {
    Created(u64),
    Skipped(u64),
    Failed(u64),
    Missing(u64),
}

pub struct FakeNewsService {
    store: Arc<NewsStore>,
    generator: Arc<dyn Generator>,
    publisher: EventPublisher,
    concurrency: usize,
}

impl FakeNewsService {
    pub fn new(
        store: Arc<NewsStore>,
        generator: Arc<dyn Generator>,
        publisher: EventPublisher,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            generator,
            publisher,
            concurrency: concurrency.max(1),
        }
    }

    #[instrument(level = "info", skip_all, fields(ids = ids.len()))]
    pub async fn generate_for(&self, ids: &[u64]) -> FakeNewsReport {
        let mut report = FakeNewsReport::default();
        let mut unique = HashSet::new();
        let ids: Vec<u64> = ids.iter().copied().filter(|id| unique.insert(*id)).collect();

        let existing = self.store.fake_news_ids_among(&ids);
        let pending: Vec<u64> = ids.iter().copied().filter(|id| !existing.contains(id)).collect();
        report.skipped.extend(ids.iter().copied().filter(|id| existing.contains(id)));
        if !report.skipped.is_empty() {
            debug!(skipped = ?report.skipped, "Fake news already present");
        }

        let found = self.store.real_news_many(&pending);
        let found_ids: HashSet<u64> = found.iter().map(|n| n.id).collect();
        report
            .missing
            .extend(pending.iter().copied().filter(|id| !found_ids.contains(id)));

        let outcomes: Vec<ItemOutcome> = stream::iter(found)
            .map(|news| self.generate_one(news))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Created(id) => report.created.push(id),
                ItemOutcome::Skipped(id) => report.skipped.push(id),
                ItemOutcome::Failed(id) => report.failed.push(id),
                ItemOutcome::Missing(id) => report.missing.push(id),
            }
        }
        report.created.sort_unstable();
        report.skipped.sort_unstable();

        info!(
            created = report.created.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            missing = report.missing.len(),
            "Fake news batch finished"
        );

        let ready: Vec<u64> = report
            .created
            .iter()
            .chain(report.skipped.iter())
            .copied()
            .collect();
        if !ready.is_empty() {
            self.publisher
                .publish(DomainEvent::FakeNewsCreated { ids: ready });
        }
        report
    }

    async fn generate_one(&self, news: RealNews) -> ItemOutcome {
        let id = news.id;
        let content = match self.write_counterpart(&news).await {
            Ok(content) => content,
            Err(e) => {
                warn!(id, error = %e, "Fake news generation failed");
                return ItemOutcome::Failed(id);
            }
        };
        match self.store.insert_fake_news(FakeNews { id, content }) {
            Ok(()) => {
                debug!(id, "Fake news stored");
                ItemOutcome::Created(id)
            }
            Err(e) if e.is_already_exists() => {
                info!(id, "Fake news created concurrently; keeping existing row");
                ItemOutcome::Skipped(id)
            }
            Err(StoreError::NotFound { .. }) => ItemOutcome::Missing(id),
            Err(e) => {
                warn!(id, error = %e, "Failed to store fake news");
                ItemOutcome::Failed(id)
            }
        }
    }

    async fn write_counterpart(&self, news: &RealNews) -> Result<String, GenerationError> {
        let input = format!(
            "Title: {}\n\n{}",
            news.title,
            truncate_chars(&news.content, 6000)
        );
        let prompt = PromptSpec::new(GenerationTask::FakeNews, FAKE_NEWS_SYSTEM_PROMPT, input);
        let response: FakeNewsResponse = generate_json(self.generator.as_ref(), &prompt).await?;
        let content = response.content.trim().to_string();
        if content.is_empty() {
            return Err(GenerationError::Malformed("empty fake news content".into()));
        }
        Ok(content)
    }
}
