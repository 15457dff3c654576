//! Comprehension questions generated from a RealNews article.

use super::{run_batch, ItemOutcome, QuizBatchReport, QuizSet};
use crate::api::{generate_json, GenerationTask, Generator, PromptSpec};
use crate::error::{QuizError, StoreError};
use crate::models::RealNews;
use crate::store::NewsStore;
use crate::utils::truncate_chars;
use std::sync::Arc;
use tracing::{debug, instrument};

const DETAIL_QUIZ_SYSTEM_PROMPT: &str = r#"You write multiple-choice reading quizzes about a news article.
Each question must be answerable from the article alone and test a concrete
detail (a number, a name, a cause, an outcome). Give four options with exactly
one correct answer and a one-sentence explanation.
Respond with a single JSON object:
{"quizzes":[{"question":"...","options":["...","...","...","..."],"answerIndex":0,"explanation":"..."}]}"#;

pub struct DetailQuizGenerator {
    store: Arc<NewsStore>,
    generator: Arc<dyn Generator>,
    per_news: usize,
    concurrency: usize,
}

impl DetailQuizGenerator {
    pub fn new(
        store: Arc<NewsStore>,
        generator: Arc<dyn Generator>,
        per_news: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            generator,
            per_news: per_news.max(1),
            concurrency,
        }
    }

    /// Generate a detail quiz set for each id that has none yet.
    ///
    /// Ids without a RealNews row are skipped. A generation failure aborts
    /// the rest of the batch with [`QuizError::Generation`].
    #[instrument(level = "info", skip_all, fields(ids = ids.len()))]
    pub async fn generate_for(&self, ids: &[u64]) -> Result<QuizBatchReport, QuizError> {
        run_batch("detail", ids, self.concurrency, |id| self.generate_one(id)).await
    }

    async fn generate_one(&self, id: u64) -> Result<ItemOutcome, QuizError> {
        let Some(news) = self.store.real_news(id) else {
            debug!(id, "No real news for detail quiz; skipping");
            return Ok(ItemOutcome::Skipped);
        };
        if self.store.has_detail_quizzes(id) {
            debug!(id, "Detail quizzes already present; skipping");
            return Ok(ItemOutcome::Skipped);
        }

        let prompt = self.prompt(&news);
        let set: QuizSet = generate_json(self.generator.as_ref(), &prompt)
            .await
            .map_err(|source| QuizError::Generation { id, source })?;
        let bodies = set
            .into_valid(id, self.per_news)
            .map_err(|source| QuizError::Generation { id, source })?;

        match self.store.insert_detail_quizzes(id, bodies) {
            Ok(quizzes) => {
                debug!(id, count = quizzes.len(), "Detail quizzes stored");
                Ok(ItemOutcome::Created {
                    quizzes: quizzes.len(),
                })
            }
            Err(StoreError::AlreadyExists { .. }) | Err(StoreError::NotFound { .. }) => {
                debug!(id, "Detail quiz set appeared or owner vanished concurrently; skipping");
                Ok(ItemOutcome::Skipped)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn prompt(&self, news: &RealNews) -> PromptSpec {
        let input = format!(
            "Number of questions: {}\nTitle: {}\n\n{}",
            self.per_news,
            news.title,
            truncate_chars(&news.content, 6000)
        );
        PromptSpec::new(GenerationTask::DetailQuiz, DETAIL_QUIZ_SYSTEM_PROMPT, input)
    }
}
