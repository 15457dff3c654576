//! Scoring, categorisation, and top-K selection of crawled candidates.
//!
//! A [`NewsScorer`] assigns each candidate a category and a 0-100 quality
//! score. [`HeuristicScorer`] works offline from text signals;
//! [`LlmScorer`] asks the generation backend. Selection then drops
//! `NOT_FILTERED` and low scores and keeps the best `k`, highest score first,
//! earlier publication winning ties.

use crate::api::{generate_json, GenerationTask, Generator, PromptSpec};
use crate::error::GenerationError;
use crate::models::{AnalyzedNews, NewsCandidate, NewsCategory};
use crate::utils::truncate_chars;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Assessment {
    pub category: NewsCategory,
    pub score: i32,
}

#[async_trait]
pub trait NewsScorer: Send + Sync {
    async fn assess(&self, candidate: &NewsCandidate) -> Result<Assessment, GenerationError>;
}

/// Section vocabulary for articles whose keyword carries no usable section.
const CATEGORY_TERMS: &[(NewsCategory, &[&str])] = &[
    (NewsCategory::It, &["AI", "인공지능", "반도체", "스마트폰", "소프트웨어", "플랫폼", "데이터", "software", "chip"]),
    (NewsCategory::Economy, &["경제", "금리", "증시", "주가", "수출", "물가", "환율", "market", "stocks", "inflation"]),
    (NewsCategory::Politics, &["국회", "대통령", "정당", "선거", "의원", "정부", "election", "parliament"]),
    (NewsCategory::Culture, &["영화", "공연", "전시", "드라마", "음악", "축제", "film", "festival", "concert"]),
    (NewsCategory::Society, &["경찰", "사고", "법원", "교육", "날씨", "재판", "police", "court", "school"]),
];

/// Offline scorer built from content length, numbers, quotations, sentence
/// count, and keyword relevance.
///
/// | Signal | Points |
/// |--------|--------|
/// | content length | up to 40 (full at 1000 chars) |
/// | numeric tokens | 2 each, up to 20 |
/// | quotation pairs | 3 each, up to 15 |
/// | sentences | 1 each, up to 15 |
/// | keyword in title / content | 10 / 5 |
///
/// Content shorter than `min_content_chars` scores 0.
#[derive(Debug, Clone)]
pub struct HeuristicScorer {
    min_content_chars: usize,
}

impl HeuristicScorer {
    pub fn new(min_content_chars: usize) -> Self {
        Self { min_content_chars }
    }

    pub fn score(&self, candidate: &NewsCandidate) -> i32 {
        let content = &candidate.content;
        let chars = content.chars().count();
        if chars < self.min_content_chars {
            return 0;
        }

        let length = (chars * 40 / 1000).min(40) as i32;
        let numbers = content
            .split(|c: char| !c.is_ascii_digit())
            .filter(|run| !run.is_empty())
            .count();
        let quotes = content
            .chars()
            .filter(|c| matches!(c, '"' | '“' | '”' | '\'' | '‘' | '’'))
            .count()
            / 2;
        let sentences = content
            .split(['.', '?', '!'])
            .filter(|s| s.trim().chars().count() > 3)
            .count();

        let mut score = length
            + (numbers as i32 * 2).min(20)
            + (quotes as i32 * 3).min(15)
            + (sentences as i32).min(15);
        if let Some(keyword) = &candidate.keyword {
            let needle = keyword.keyword.keyword.to_lowercase();
            if candidate.title.to_lowercase().contains(&needle) {
                score += 10;
            }
            if content.to_lowercase().contains(&needle) {
                score += 5;
            }
        }
        score.clamp(0, 100)
    }

    pub fn categorize(&self, candidate: &NewsCandidate) -> NewsCategory {
        if let Some(keyword) = &candidate.keyword {
            if keyword.category != NewsCategory::NotFiltered {
                return keyword.category;
            }
        }
        let text = format!("{} {}", candidate.title, candidate.content).to_lowercase();
        CATEGORY_TERMS
            .iter()
            .map(|(category, terms)| {
                let hits = terms
                    .iter()
                    .filter(|t| text.contains(&t.to_lowercase()))
                    .count();
                (*category, hits)
            })
            .filter(|(_, hits)| *hits > 0)
            .max_by_key(|(_, hits)| *hits)
            .map(|(category, _)| category)
            .unwrap_or(NewsCategory::NotFiltered)
    }
}

#[async_trait]
impl NewsScorer for HeuristicScorer {
    async fn assess(&self, candidate: &NewsCandidate) -> Result<Assessment, GenerationError> {
        Ok(Assessment {
            category: self.categorize(candidate),
            score: self.score(candidate),
        })
    }
}

const ANALYSIS_SYSTEM_PROMPT: &str = r#"You grade news articles for a quiz service.
Assign the article to one section: SOCIETY, ECONOMY, POLITICS, CULTURE or IT, or
NOT_FILTERED when none fits. Score its quiz value from 0 to 100: reward concrete,
checkable facts (numbers, names, dates, quotes) and penalise opinion, ads and
very short pieces.
Respond with a single JSON object: {"category":"IT","score":75}"#;

/// Scores through the generation backend.
pub struct LlmScorer {
    generator: Arc<dyn Generator>,
}

impl LlmScorer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl NewsScorer for LlmScorer {
    async fn assess(&self, candidate: &NewsCandidate) -> Result<Assessment, GenerationError> {
        let input = format!(
            "Title: {}\nSearch keyword: {}\n\n{}",
            candidate.title,
            candidate
                .keyword
                .as_ref()
                .map(|k| k.keyword.keyword.as_str())
                .unwrap_or("-"),
            truncate_chars(&candidate.content, 4000)
        );
        let prompt = PromptSpec::new(GenerationTask::Analysis, ANALYSIS_SYSTEM_PROMPT, input);
        let mut assessment: Assessment = generate_json(self.generator.as_ref(), &prompt).await?;
        assessment.score = assessment.score.clamp(0, 100);
        Ok(assessment)
    }
}

/// Drop unfit entries and keep the best `k`.
pub fn select(analyzed: Vec<AnalyzedNews>, min_score: i32, k: usize) -> Vec<AnalyzedNews> {
    analyzed
        .into_iter()
        .filter(|a| a.category != NewsCategory::NotFiltered && a.score >= min_score)
        .sorted_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.candidate.origin_created_date.cmp(&b.candidate.origin_created_date))
        })
        .take(k)
        .collect()
}

/// Result of one analysis pass.
#[derive(Debug, Default)]
pub struct AnalysisOutcome {
    /// Candidates that received a score.
    pub scored: usize,
    pub selected: Vec<AnalyzedNews>,
}

pub struct NewsAnalysisService {
    scorer: Arc<dyn NewsScorer>,
    min_score: i32,
    concurrency: usize,
}

impl NewsAnalysisService {
    pub fn new(scorer: Arc<dyn NewsScorer>, min_score: i32, concurrency: usize) -> Self {
        Self {
            scorer,
            min_score,
            concurrency: concurrency.max(1),
        }
    }

    /// Score every candidate and select at most `k`.
    ///
    /// A candidate the scorer fails on is dropped; the rest still compete.
    #[instrument(level = "info", skip_all, fields(candidates = candidates.len(), k))]
    pub async fn analyze(&self, candidates: Vec<NewsCandidate>, k: usize) -> AnalysisOutcome {
        let total = candidates.len();
        let analyzed: Vec<AnalyzedNews> = stream::iter(candidates)
            .map(|candidate| {
                let scorer = Arc::clone(&self.scorer);
                async move {
                    match scorer.assess(&candidate).await {
                        Ok(Assessment { category, score }) => {
                            debug!(link = %candidate.link, %category, score, "Scored candidate");
                            Some(AnalyzedNews {
                                candidate,
                                score,
                                category,
                            })
                        }
                        Err(e) => {
                            warn!(link = %candidate.link, error = %e, "Scoring failed; dropping candidate");
                            None
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(std::future::ready)
            .collect()
            .await;

        let scored = analyzed.len();
        let selected = select(analyzed, self.min_score, k);
        info!(
            total,
            scored,
            selected = selected.len(),
            min_score = self.min_score,
            "Analysis finished"
        );
        AnalysisOutcome { scored, selected }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategorizedKeyword, KeywordType, KeywordWithType};
    use crate::testing::{analyzed, candidate, FnGenerator};
    use chrono::Duration;

    #[test]
    fn test_select_bounds_and_orders() {
        let mut items: Vec<AnalyzedNews> = [55, 90, 30, 90, 70]
            .iter()
            .enumerate()
            .map(|(i, score)| analyzed(i, *score))
            .collect();
        // Item 3 ties item 1 but was published earlier.
        items[3].candidate.origin_created_date = items[1].candidate.origin_created_date - Duration::hours(1);
        items[4].category = NewsCategory::NotFiltered;

        let selected = select(items.clone(), 40, 3);
        let order: Vec<_> = selected.iter().map(|a| a.candidate.link.clone()).collect();
        assert_eq!(
            order,
            vec![
                items[3].candidate.link.clone(),
                items[1].candidate.link.clone(),
                items[0].candidate.link.clone()
            ]
        );
        assert!(selected.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(select(items, 40, 1).len(), 1);
    }

    #[test]
    fn test_heuristic_prefers_informative_content() {
        let scorer = HeuristicScorer::new(200);
        let rich = candidate(1);
        let mut thin = candidate(2);
        thin.content = "짧은 기사입니다. ".repeat(30);
        thin.keyword = None;
        assert!(scorer.score(&rich) > scorer.score(&thin));
        assert!(scorer.score(&rich) >= 40);

        let mut tiny = candidate(3);
        tiny.content = "too short".into();
        assert_eq!(scorer.score(&tiny), 0);
    }

    #[test]
    fn test_heuristic_category_from_keyword_then_terms() {
        let scorer = HeuristicScorer::new(0);
        let mut c = candidate(1);
        c.keyword = Some(CategorizedKeyword {
            keyword: KeywordWithType {
                keyword: "Rates".into(),
                keyword_type: KeywordType::Ongoing,
            },
            category: NewsCategory::Economy,
        });
        assert_eq!(scorer.categorize(&c), NewsCategory::Economy);

        c.keyword = None;
        c.title = "국회 본회의, 선거법 개정안 처리".into();
        c.content = "국회는 오늘 선거법을 처리했다.".into();
        assert_eq!(scorer.categorize(&c), NewsCategory::Politics);

        c.title = "Untitled".into();
        c.content = "Nothing to see here.".into();
        assert_eq!(scorer.categorize(&c), NewsCategory::NotFiltered);
    }

    #[tokio::test]
    async fn test_analyze_drops_failed_and_unfit() {
        let generator = FnGenerator::new(|prompt| {
            if prompt.input.contains("Title: broken") {
                Ok("not json".to_string())
            } else if prompt.input.contains("Title: vague") {
                Ok(r#"{"category": "SPORTS", "score": 95}"#.to_string())
            } else {
                Ok(r#"{"category": "IT", "score": 140}"#.to_string())
            }
        });
        let scorer = LlmScorer::new(Arc::new(generator));
        let service = NewsAnalysisService::new(Arc::new(scorer), 40, 2);

        let mut broken = candidate(1);
        broken.title = "broken".into();
        let mut vague = candidate(2);
        vague.title = "vague".into();
        let good = candidate(3);

        let outcome = service.analyze(vec![broken, vague, good.clone()], 5).await;
        assert_eq!(outcome.scored, 2);
        assert_eq!(outcome.selected.len(), 1);
        assert_eq!(outcome.selected[0].candidate.link, good.link);
        assert_eq!(outcome.selected[0].score, 100);
        assert_eq!(outcome.selected[0].category, NewsCategory::It);
    }
}
