//! Real-or-fake questions built from a RealNews article and its FakeNews twin.

use super::{run_batch, ItemOutcome, QuizBatchReport, QuizSet};
use crate::api::{generate_json, GenerationTask, Generator, PromptSpec};
use crate::error::{QuizError, StoreError};
use crate::models::{FakeNews, RealNews};
use crate::store::NewsStore;
use crate::utils::truncate_chars;
use std::sync::Arc;
use tracing::{debug, instrument};

const FACT_QUIZ_SYSTEM_PROMPT: &str = r#"You write fact-check quizzes.
You are given a real news article (REAL) and an altered copy (FAKE) whose
details were changed. Write multiple-choice questions whose options mix
statements from both versions; the correct option is the statement that is
true according to REAL. Explain which detail FAKE changed.
Respond with a single JSON object:
{"quizzes":[{"question":"...","options":["...","...","...","..."],"answerIndex":0,"explanation":"..."}]}"#;

pub struct FactQuizGenerator {
    store: Arc<NewsStore>,
    generator: Arc<dyn Generator>,
    per_news: usize,
    concurrency: usize,
}

impl FactQuizGenerator {
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

    /// Generate a fact quiz set for each id whose FakeNews exists and has none yet.
    ///
    /// An empty id list is a no-op.
    #[instrument(level = "info", skip_all, fields(ids = ids.len()))]
    pub async fn generate_for(&self, ids: &[u64]) -> Result<QuizBatchReport, QuizError> {
        if ids.is_empty() {
            debug!("No ids; nothing to do");
            return Ok(QuizBatchReport::default());
        }
        run_batch("fact", ids, self.concurrency, |id| self.generate_one(id)).await
    }

    async fn generate_one(&self, id: u64) -> Result<ItemOutcome, QuizError> {
        let (Some(real), Some(fake)) = (self.store.real_news(id), self.store.fake_news(id)) else {
            debug!(id, "Real or fake news missing for fact quiz; skipping");
            return Ok(ItemOutcome::Skipped);
        };
        if self.store.has_fact_quizzes(id) {
            debug!(id, "Fact quizzes already present; skipping");
            return Ok(ItemOutcome::Skipped);
        }

        let prompt = self.prompt(&real, &fake);
        let set: QuizSet = generate_json(self.generator.as_ref(), &prompt)
            .await
            .map_err(|source| QuizError::Generation { id, source })?;
        let bodies = set
            .into_valid(id, self.per_news)
            .map_err(|source| QuizError::Generation { id, source })?;

        match self.store.insert_fact_quizzes(id, bodies) {
            Ok(quizzes) => {
                debug!(id, count = quizzes.len(), "Fact quizzes stored");
                Ok(ItemOutcome::Created {
                    quizzes: quizzes.len(),
                })
            }
            Err(StoreError::AlreadyExists { .. }) | Err(StoreError::NotFound { .. }) => {
                Ok(ItemOutcome::Skipped)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn prompt(&self, real: &RealNews, fake: &FakeNews) -> PromptSpec {
        let input = format!(
            "Number of questions: {}\nTitle: {}\n\nREAL:\n{}\n\nFAKE:\n{}",
            self.per_news,
            real.title,
            truncate_chars(&real.content, 4000),
            truncate_chars(&fake.content, 4000)
        );
        PromptSpec::new(GenerationTask::FactQuiz, FACT_QUIZ_SYSTEM_PROMPT, input)
    }
}
