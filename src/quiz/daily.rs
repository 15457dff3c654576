//! Daily quiz sets drawn from today's news detail quizzes.
//!
//! No generation call is made: the set is picked from the designated
//! article's detail quizzes that no earlier daily set has used. Runs on the
//! single-worker daily pool, so picks for one designation never race.

use crate::error::{QuizError, StoreError};
use crate::store::NewsStore;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyOutcome {
    Created { quizzes: usize },
    /// Designation gone (superseded) or already holding a set.
    Skipped,
    /// No unused detail quiz was available.
    NothingToDraw,
}

pub struct DailyQuizGenerator {
    store: Arc<NewsStore>,
    count: usize,
}

impl DailyQuizGenerator {
    pub fn new(store: Arc<NewsStore>, count: usize) -> Self {
        Self {
            store,
            count: count.max(1),
        }
    }

    #[instrument(level = "info", skip(self))]
    pub async fn generate(&self, today_news_id: u64) -> Result<DailyOutcome, QuizError> {
        let Some(today) = self.store.today_news(today_news_id) else {
            debug!("Designation no longer present; skipping");
            return Ok(DailyOutcome::Skipped);
        };
        if self.store.has_daily_quizzes(today_news_id) {
            debug!("Daily quizzes already present; skipping");
            return Ok(DailyOutcome::Skipped);
        }

        let used = self.store.used_detail_quiz_ids();
        let picks: Vec<_> = self
            .store
            .detail_quizzes_for(today_news_id)
            .into_iter()
            .filter(|q| !used.contains(&q.id))
            .take(self.count)
            .collect();
        if picks.is_empty() {
            warn!(date = %today.selected_date, "No unused detail quizzes for today's news");
            return Ok(DailyOutcome::NothingToDraw);
        }

        match self.store.insert_daily_quizzes(today_news_id, picks) {
            Ok(quizzes) => {
                info!(date = %today.selected_date, count = quizzes.len(), "Daily quizzes stored");
                Ok(DailyOutcome::Created {
                    quizzes: quizzes.len(),
                })
            }
            Err(StoreError::AlreadyExists { .. }) | Err(StoreError::NotFound { .. }) => {
                Ok(DailyOutcome::Skipped)
            }
            Err(e) => Err(e.into()),
        }
    }
}
