//! Quiz generators for the three quiz kinds.
//!
//! - [`detail::DetailQuizGenerator`]: questions about one RealNews article
//! - [`fact::FactQuizGenerator`]: real-or-fake questions from a RealNews and its FakeNews
//! - [`daily::DailyQuizGenerator`]: today's set, drawn from unused detail quizzes
//!
//! Every generator checks for existing quizzes before doing any work, so a
//! rerun only fills in what is still missing.

pub mod daily;
pub mod detail;
pub mod fact;

use crate::error::{GenerationError, QuizError};
use crate::models::QuizBody;
use futures::stream::{self, StreamExt, TryStreamExt};
use itertools::Itertools;
use serde::Deserialize;
use std::future::Future;
use tracing::{info, warn};

/// The JSON shape quiz prompts ask for.
#[derive(Debug, Deserialize)]
pub(crate) struct QuizSet {
    pub quizzes: Vec<QuizBody>,
}

impl QuizSet {
    /// Keep valid questions, at most `max` of them.
    ///
    /// A set with no valid question at all is malformed.
    pub(crate) fn into_valid(self, id: u64, max: usize) -> Result<Vec<QuizBody>, GenerationError> {
        let total = self.quizzes.len();
        let valid: Vec<QuizBody> = self
            .quizzes
            .into_iter()
            .filter(|q| match q.validate() {
                Ok(()) => true,
                Err(reason) => {
                    warn!(id, %reason, question = %q.question, "Dropping invalid quiz");
                    false
                }
            })
            .unique_by(|q| q.question.trim().to_string())
            .take(max)
            .collect();
        if valid.is_empty() {
            return Err(GenerationError::Malformed(format!(
                "no valid quiz among {total} returned"
            )));
        }
        Ok(valid)
    }
}

/// How one owner fared in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Created { quizzes: usize },
    Skipped,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QuizBatchReport {
    /// Owners that received a new quiz set.
    pub created: usize,
    pub quizzes: usize,
    pub skipped: usize,
}

/// Run `job` for each distinct id with bounded concurrency.
///
/// The first error stops the batch: jobs not yet started are never run, and
/// sets already committed by finished jobs stay.
pub(crate) async fn run_batch<F, Fut>(
    kind: &'static str,
    ids: &[u64],
    concurrency: usize,
    job: F,
) -> Result<QuizBatchReport, QuizError>
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = Result<ItemOutcome, QuizError>>,
{
    let outcomes: Vec<ItemOutcome> = stream::iter(ids.iter().copied().unique())
        .map(job)
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    let mut report = QuizBatchReport::default();
    for outcome in outcomes {
        match outcome {
            ItemOutcome::Created { quizzes } => {
                report.created += 1;
                report.quizzes += quizzes;
            }
            ItemOutcome::Skipped => report.skipped += 1,
        }
    }
    info!(
        kind,
        created = report.created,
        quizzes = report.quizzes,
        skipped = report.skipped,
        "Quiz batch finished"
    );
    Ok(report)
}
