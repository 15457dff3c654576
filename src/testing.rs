//! Deterministic stand-ins for the network-facing collaborators.

use crate::api::{GenerationTask, Generator, PromptSpec};
use crate::collection::{ArticleCrawler, NewsSearch};
use crate::error::{CollectionError, GenerationError};
use crate::models::{
    AnalyzedNews, CategorizedKeyword, KeywordType, KeywordWithType, NaverNewsDto, NewsCandidate,
    NewsCategory, NewsDetail, QuizBody,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

type Respond = dyn Fn(&PromptSpec) -> Result<String, GenerationError> + Send + Sync;

/// A [`Generator`] backed by a closure.
pub struct FnGenerator {
    respond: Box<Respond>,
}

impl FnGenerator {
    pub fn new(
        respond: impl Fn(&PromptSpec) -> Result<String, GenerationError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
        }
    }

    /// Canned, valid answers for every task.
    pub fn canned() -> Self {
        Self::new(canned_answer)
    }
}

/// The answer [`FnGenerator::canned`] gives for `prompt`.
pub fn canned_answer(prompt: &PromptSpec) -> Result<String, GenerationError> {
    Ok(match prompt.task {
        GenerationTask::Keywords => r#"{
            "society": [{"keyword": "Flood", "type": "BREAKING"}],
            "economy": [],
            "politics": [],
            "culture": [],
            "it": [{"keyword": "AI", "type": "ONGOING"}]
        }"#
        .to_string(),
        GenerationTask::Analysis => r#"{"category": "IT", "score": 80}"#.to_string(),
        GenerationTask::FakeNews => r#"{"content": "An altered account of the story."}"#.to_string(),
        GenerationTask::DetailQuiz | GenerationTask::FactQuiz => quiz_set_json(3),
    })
}

#[async_trait]
impl Generator for FnGenerator {
    async fn generate(&self, prompt: &PromptSpec) -> Result<String, GenerationError> {
        (self.respond)(prompt)
    }
}

/// Search backend with fixed results per keyword; unknown keywords fail.
#[derive(Default)]
pub struct StaticSearch {
    results: HashMap<String, Vec<NaverNewsDto>>,
}

impl StaticSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, keyword: &str, hits: Vec<NaverNewsDto>) -> Self {
        self.results.insert(keyword.to_string(), hits);
        self
    }
}

#[async_trait]
impl NewsSearch for StaticSearch {
    async fn search(&self, keyword: &str) -> Result<Vec<NaverNewsDto>, CollectionError> {
        self.results
            .get(keyword)
            .cloned()
            .ok_or_else(|| CollectionError::Api {
                status: 404,
                body: format!("no results scripted for {keyword}"),
            })
    }
}

/// Crawler that records what it was asked for and fails on chosen URLs.
#[derive(Default)]
pub struct ScriptedCrawler {
    failing: HashSet<String>,
    crawled: Mutex<Vec<String>>,
}

impl ScriptedCrawler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn crawled(&self) -> Vec<String> {
        self.crawled.lock().clone()
    }
}

#[async_trait]
impl ArticleCrawler for ScriptedCrawler {
    async fn crawl(&self, url: &str) -> Result<NewsDetail, CollectionError> {
        self.crawled.lock().push(url.to_string());
        if self.failing.contains(url) {
            return Err(CollectionError::ScrapeFailed {
                url: url.to_string(),
                reason: "scripted failure".into(),
            });
        }
        Ok(NewsDetail {
            content: article_body(),
            image_url: Some(format!("{url}/image.jpg")),
            journalist: Some("Reporter Kim".into()),
            media_name: None,
        })
    }
}

fn article_body() -> String {
    "On 18 October 2026 AI chip exports rose 12% from a year earlier, \"the ministry\" said. ".repeat(10)
}

fn base_date() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2026-10-18T09:00:00+09:00").expect("valid test date")
}

/// Search hit `i`; equal `i` gives equal links.
pub fn hit(i: usize) -> NaverNewsDto {
    NaverNewsDto {
        title: format!("AI chip exports rise, article {i}"),
        original_link: format!("https://www.outlet{i}.co.kr/news/{i}"),
        link: format!("https://n.news.naver.com/article/001/{i}"),
        description: format!("Summary of article {i}"),
        pub_date: base_date() - Duration::minutes(i as i64),
    }
}

pub fn ai_keyword() -> CategorizedKeyword {
    CategorizedKeyword {
        keyword: KeywordWithType {
            keyword: "AI".into(),
            keyword_type: KeywordType::Breaking,
        },
        category: NewsCategory::It,
    }
}

/// A crawled candidate for hit `i`.
pub fn candidate(i: usize) -> NewsCandidate {
    NewsCandidate::from_parts(
        hit(i),
        NewsDetail {
            content: article_body(),
            image_url: None,
            journalist: None,
            media_name: None,
        },
        Some(ai_keyword()),
    )
}

pub fn analyzed(i: usize, score: i32) -> AnalyzedNews {
    AnalyzedNews {
        candidate: candidate(i),
        score,
        category: NewsCategory::It,
    }
}

pub fn quiz_body(n: usize) -> QuizBody {
    QuizBody {
        question: format!("Question {n}?"),
        options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
        answer_index: n % 4,
        explanation: format!("Because {n}."),
    }
}

/// A `{"quizzes": [...]}` payload with `n` valid questions.
pub fn quiz_set_json(n: usize) -> String {
    let quizzes: Vec<QuizBody> = (1..=n).map(quiz_body).collect();
    serde_json::json!({ "quizzes": quizzes }).to_string()
}
