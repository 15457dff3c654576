//! Daily keyword selection.
//!
//! The generator is asked for candidates in every section. Candidates are
//! then rejected when they are excluded by the caller, were already used in
//! the same section today, or are overused across the trailing window.
//! Survivors are recorded in the [`history::KeywordHistoryStore`].
//!
//! A failed or unparsable generation fails the whole call; partial keyword
//! sets are never returned.

pub mod history;

use crate::api::{generate_json, GenerationTask, Generator, PromptSpec};
use crate::config::KeywordConfig;
use crate::error::KeywordError;
use crate::models::{GeneratedKeywords, KeywordWithType, NewsCategory};
use chrono::{Days, NaiveDate, Utc};
use history::{normalize_keyword, KeywordHistoryStore};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, info, instrument};

const KEYWORD_SYSTEM_PROMPT: &str = r#"You pick search keywords for a Korean news quiz service.
For each section (society, economy, politics, culture, it) propose short, concrete
search keywords that are likely to return fresh articles today. Label each with
its type: BREAKING (new today), ONGOING (developing story), GENERAL (evergreen
topic) or SEASONAL (tied to the time of year).
Never propose a keyword from the excluded or recently used lists.
Respond with a single JSON object of the form:
{"society":[{"keyword":"...","type":"BREAKING"}],"economy":[...],"politics":[...],"culture":[...],"it":[...]}"#;

#[derive(Debug, Deserialize)]
struct KeywordResponse {
    society: Vec<KeywordWithType>,
    economy: Vec<KeywordWithType>,
    politics: Vec<KeywordWithType>,
    culture: Vec<KeywordWithType>,
    it: Vec<KeywordWithType>,
}

impl KeywordResponse {
    fn into_sections(self) -> [(NewsCategory, Vec<KeywordWithType>); 5] {
        [
            (NewsCategory::Society, self.society),
            (NewsCategory::Economy, self.economy),
            (NewsCategory::Politics, self.politics),
            (NewsCategory::Culture, self.culture),
            (NewsCategory::It, self.it),
        ]
    }
}

pub struct KeywordGenerationService {
    generator: Arc<dyn Generator>,
    history: Arc<KeywordHistoryStore>,
    config: KeywordConfig,
}

impl KeywordGenerationService {
    pub fn new(
        generator: Arc<dyn Generator>,
        history: Arc<KeywordHistoryStore>,
        config: KeywordConfig,
    ) -> Self {
        Self {
            generator,
            history,
            config,
        }
    }

    /// Produce and record the keyword set for `date`.
    #[instrument(level = "info", skip_all, fields(%date, exclusions = exclusions.len()))]
    pub async fn generate(
        &self,
        date: NaiveDate,
        exclusions: &[String],
    ) -> Result<GeneratedKeywords, KeywordError> {
        let recent_since = days_before(date, self.config.recent_days);
        let recent = self.history.recent(recent_since, date);
        let prompt = self.build_prompt(date, &recent, exclusions);

        let response: KeywordResponse = generate_json(self.generator.as_ref(), &prompt).await?;

        let excluded: HashSet<String> = exclusions.iter().map(|e| normalize_keyword(e)).collect();
        let used_today = self.history.used_on(date);
        let window_since = days_before(date, self.config.overuse_window_days);
        let overused = self
            .history
            .overused(window_since, date, self.config.overuse_threshold);

        let mut generated = GeneratedKeywords {
            date: Some(date),
            ..GeneratedKeywords::default()
        };
        let mut rejected = 0usize;
        for (category, candidates) in response.into_sections() {
            let mut accepted: Vec<KeywordWithType> = Vec::new();
            let mut seen = HashSet::new();
            for candidate in candidates {
                let key = normalize_keyword(&candidate.keyword);
                let reason = if key.is_empty() {
                    Some("blank")
                } else if excluded.contains(&key) {
                    Some("excluded")
                } else if used_today.contains(&(key.clone(), category)) {
                    Some("used today")
                } else if overused.contains(&key) {
                    Some("overused")
                } else if !seen.insert(key) {
                    Some("repeated")
                } else if accepted.len() >= self.config.per_category {
                    Some("over quota")
                } else {
                    None
                };
                match reason {
                    Some(reason) => {
                        rejected += 1;
                        debug!(keyword = %candidate.keyword, %category, reason, "Keyword rejected");
                    }
                    None => accepted.push(KeywordWithType {
                        keyword: candidate.keyword.trim().to_string(),
                        keyword_type: candidate.keyword_type,
                    }),
                }
            }
            if !accepted.is_empty() {
                generated.by_category.insert(category, accepted);
            }
        }

        let now = Utc::now();
        for keyword in generated.flatten() {
            self.history
                .record(&keyword.keyword, keyword.category, date, now);
        }

        info!(accepted = generated.len(), rejected, "Keywords generated");
        Ok(generated)
    }

    fn build_prompt(
        &self,
        date: NaiveDate,
        recent: &[KeywordWithType],
        exclusions: &[String],
    ) -> PromptSpec {
        let mut input = String::new();
        let _ = writeln!(input, "Date: {date}");
        let _ = writeln!(input, "Keywords per section: {}", self.config.per_category);
        let recent_list = recent
            .iter()
            .map(|k| k.keyword.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(input, "Recently used: [{recent_list}]");
        let _ = writeln!(input, "Excluded: [{}]", exclusions.join(", "));
        PromptSpec::new(GenerationTask::Keywords, KEYWORD_SYSTEM_PROMPT, input)
    }
}

/// The date `days` before `date`, saturating at the calendar start.
pub(crate) fn days_before(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_sub_days(Days::new(days.max(0) as u64))
        .unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::models::KeywordType;
    use crate::testing::FnGenerator;
    use std::sync::Mutex;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn service(response: &'static str, history: Arc<KeywordHistoryStore>) -> KeywordGenerationService {
        let generator = FnGenerator::new(move |_| Ok(response.to_string()));
        KeywordGenerationService::new(Arc::new(generator), history, KeywordConfig::default())
    }

    const RESPONSE: &str = r#"{
        "society": [{"keyword": "Flood", "type": "BREAKING"}, {"keyword": "flood ", "type": "ONGOING"}],
        "economy": [{"keyword": "Rates", "type": "ONGOING"}, {"keyword": "Banned", "type": "GENERAL"}],
        "politics": [{"keyword": "Election", "type": "ONGOING"}],
        "culture": [{"keyword": "Film festival", "type": "SEASONAL"}, {"keyword": "  ", "type": "GENERAL"}],
        "it": [{"keyword": "AI", "type": "GENERAL"}]
    }"#;

    #[tokio::test]
    async fn test_filters_exclusions_same_day_and_overuse() {
        let history = Arc::new(KeywordHistoryStore::new());
        let kw = |s: &str| KeywordWithType {
            keyword: s.into(),
            keyword_type: KeywordType::General,
        };
        // AI already used today in IT.
        history.record(&kw("AI"), NewsCategory::It, day(18), Utc::now());
        // Election used three times this week.
        for d in [14, 15, 16] {
            history.record(&kw("Election"), NewsCategory::Politics, day(d), Utc::now());
        }
        let used_before = history.used_on(day(18));

        let service = service(RESPONSE, Arc::clone(&history));
        let generated = service.generate(day(18), &["banned".to_string()]).await.unwrap();
        let flat = generated.flatten();
        let names: Vec<_> = flat.iter().map(|k| k.keyword.keyword.as_str()).collect();

        assert_eq!(names, vec!["Flood", "Rates", "Film festival"]);
        for k in &flat {
            assert_ne!(normalize_keyword(&k.keyword.keyword), "banned");
            assert!(!used_before.contains(&(normalize_keyword(&k.keyword.keyword), k.category)));
        }
    }

    #[tokio::test]
    async fn test_accepted_keywords_are_recorded() {
        let history = Arc::new(KeywordHistoryStore::new());
        let service = service(RESPONSE, Arc::clone(&history));
        let generated = service.generate(day(18), &[]).await.unwrap();
        assert_eq!(history.len(), generated.len());
        assert!(history
            .used_on(day(18))
            .contains(&("ai".to_string(), NewsCategory::It)));
    }

    #[tokio::test]
    async fn test_second_run_same_day_rejects_everything() {
        let history = Arc::new(KeywordHistoryStore::new());
        let service = service(RESPONSE, Arc::clone(&history));
        service.generate(day(18), &[]).await.unwrap();
        let again = service.generate(day(18), &[]).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_quota_per_category() {
        let history = Arc::new(KeywordHistoryStore::new());
        let response = r#"{"society": [], "economy": [], "politics": [], "culture": [],
            "it": [{"keyword": "A", "type": "GENERAL"}, {"keyword": "B", "type": "GENERAL"},
                   {"keyword": "C", "type": "GENERAL"}, {"keyword": "D", "type": "GENERAL"}]}"#;
        let service = service(response, history);
        let generated = service.generate(day(18), &[]).await.unwrap();
        assert_eq!(generated.by_category[&NewsCategory::It].len(), 3);
    }

    #[tokio::test]
    async fn test_missing_section_fails_whole_generation() {
        let history = Arc::new(KeywordHistoryStore::new());
        let service = service(r#"{"society": [], "it": []}"#, Arc::clone(&history));
        let result = service.generate(day(18), &[]).await;
        assert!(matches!(
            result,
            Err(KeywordError::Generation(GenerationError::Malformed(_)))
        ));
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let history = Arc::new(KeywordHistoryStore::new());
        let generator = FnGenerator::new(|_| Err(GenerationError::Unavailable("down".into())));
        let service = KeywordGenerationService::new(Arc::new(generator), history, KeywordConfig::default());
        assert!(service.generate(day(18), &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_prompt_lists_recent_and_excluded() {
        let history = Arc::new(KeywordHistoryStore::new());
        history.record(
            &KeywordWithType {
                keyword: "Typhoon".into(),
                keyword_type: KeywordType::Breaking,
            },
            NewsCategory::Society,
            day(17),
            Utc::now(),
        );
        let seen = Arc::new(Mutex::new(String::new()));
        let capture = Arc::clone(&seen);
        let generator = FnGenerator::new(move |prompt| {
            *capture.lock().unwrap() = prompt.input.clone();
            Ok(RESPONSE.to_string())
        });
        let service = KeywordGenerationService::new(Arc::new(generator), history, KeywordConfig::default());
        service.generate(day(18), &["Banned".into()]).await.unwrap();
        let input = seen.lock().unwrap().clone();
        assert!(input.contains("Recently used: [Typhoon]"));
        assert!(input.contains("Excluded: [Banned]"));
    }

    #[test]
    fn test_days_before() {
        assert_eq!(days_before(day(18), 7), day(11));
        assert_eq!(days_before(day(18), -3), day(18));
    }
}
