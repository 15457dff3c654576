//! Data models shared by every pipeline stage.
//!
//! - Keyword values: [`KeywordWithType`], [`CategorizedKeyword`], [`KeywordHistory`]
//! - Collection: [`NaverNewsDto`], [`NewsDetail`], [`NewsCandidate`]
//! - Analysis: [`AnalyzedNews`]
//! - Persisted rows: [`RealNews`], [`FakeNews`], [`TodayNews`] and the three quiz kinds
//!
//! Persisted rows are plain values; the stores in [`crate::store`] and
//! [`crate::keywords::history`] enforce their uniqueness rules.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How a keyword relates to the news cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeywordType {
    Breaking,
    Ongoing,
    General,
    Seasonal,
}

/// News section. `NotFiltered` marks articles whose section could not be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NewsCategory {
    Society,
    Economy,
    Politics,
    Culture,
    It,
    #[serde(other)]
    NotFiltered,
}

impl NewsCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NewsCategory::Society => "SOCIETY",
            NewsCategory::Economy => "ECONOMY",
            NewsCategory::Politics => "POLITICS",
            NewsCategory::Culture => "CULTURE",
            NewsCategory::It => "IT",
            NewsCategory::NotFiltered => "NOT_FILTERED",
        }
    }

    /// Lenient parse used for CLI input and model output.
    pub fn parse(s: &str) -> NewsCategory {
        match s.trim().to_ascii_uppercase().as_str() {
            "SOCIETY" => NewsCategory::Society,
            "ECONOMY" => NewsCategory::Economy,
            "POLITICS" => NewsCategory::Politics,
            "CULTURE" => NewsCategory::Culture,
            "IT" => NewsCategory::It,
            _ => NewsCategory::NotFiltered,
        }
    }
}

impl fmt::Display for NewsCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated keyword and its news-cycle type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeywordWithType {
    pub keyword: String,
    #[serde(rename = "type")]
    pub keyword_type: KeywordType,
}

/// A keyword together with the section it was generated for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategorizedKeyword {
    pub keyword: KeywordWithType,
    pub category: NewsCategory,
}

/// One day's keyword set, grouped by section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratedKeywords {
    pub date: Option<NaiveDate>,
    pub by_category: BTreeMap<NewsCategory, Vec<KeywordWithType>>,
}

impl GeneratedKeywords {
    pub fn flatten(&self) -> Vec<CategorizedKeyword> {
        self.by_category
            .iter()
            .flat_map(|(category, keywords)| {
                keywords.iter().map(move |k| CategorizedKeyword {
                    keyword: k.clone(),
                    category: *category,
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Usage ledger row, unique per (keyword, category, used_date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordHistory {
    pub id: u64,
    pub keyword: String,
    pub keyword_type: KeywordType,
    pub category: NewsCategory,
    pub used_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub use_count: u32,
}

/// One search hit from the news API, already cleaned of markup.
#[derive(Debug, Clone, PartialEq)]
pub struct NaverNewsDto {
    pub title: String,
    pub original_link: String,
    pub link: String,
    pub description: String,
    pub pub_date: DateTime<FixedOffset>,
}

/// What crawling an article's origin page yields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewsDetail {
    pub content: String,
    pub image_url: Option<String>,
    pub journalist: Option<String>,
    pub media_name: Option<String>,
}

/// A crawled article waiting for scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct NewsCandidate {
    pub title: String,
    pub content: String,
    pub description: String,
    pub link: String,
    pub original_url: String,
    pub image_url: Option<String>,
    pub origin_created_date: DateTime<FixedOffset>,
    pub media_name: Option<String>,
    pub journalist: Option<String>,
    /// The keyword whose search surfaced this article.
    pub keyword: Option<CategorizedKeyword>,
}

impl NewsCandidate {
    pub fn from_parts(hit: NaverNewsDto, detail: NewsDetail, keyword: Option<CategorizedKeyword>) -> Self {
        let media_name = detail.media_name.or_else(|| source_tag(&hit.original_link));
        NewsCandidate {
            title: hit.title,
            content: detail.content,
            description: hit.description,
            link: hit.link,
            original_url: hit.original_link,
            image_url: detail.image_url,
            origin_created_date: hit.pub_date,
            media_name,
            journalist: detail.journalist,
            keyword,
        }
    }
}

/// A scored candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedNews {
    pub candidate: NewsCandidate,
    pub score: i32,
    pub category: NewsCategory,
}

/// Canonical article, immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealNews {
    pub id: u64,
    pub title: String,
    pub content: String,
    pub description: String,
    pub link: String,
    pub image_url: Option<String>,
    pub origin_created_date: DateTime<FixedOffset>,
    pub created_date: DateTime<Utc>,
    pub media_name: Option<String>,
    pub journalist: Option<String>,
    pub original_url: String,
    pub category: NewsCategory,
}

/// Synthetic counterpart; `id` is the owning [`RealNews`] id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FakeNews {
    pub id: u64,
    pub content: String,
}

/// Today's-news designation; `id` is the designated [`RealNews`] id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodayNews {
    pub id: u64,
    pub selected_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuizType {
    Detail,
    Fact,
    Daily,
}

/// Question, options and answer shared by all quiz kinds.
///
/// This is also the shape the generation backend is asked to return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizBody {
    pub question: String,
    pub options: Vec<String>,
    pub answer_index: usize,
    #[serde(default)]
    pub explanation: String,
}

impl QuizBody {
    /// Check the invariants a playable question must hold.
    pub fn validate(&self) -> Result<(), String> {
        if self.question.trim().is_empty() {
            return Err("empty question".into());
        }
        if self.options.len() < 2 {
            return Err(format!("need at least 2 options, got {}", self.options.len()));
        }
        if self.options.iter().any(|o| o.trim().is_empty()) {
            return Err("blank option".into());
        }
        if self.answer_index >= self.options.len() {
            return Err(format!(
                "answer index {} out of range for {} options",
                self.answer_index,
                self.options.len()
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailQuiz {
    pub id: u64,
    pub real_news_id: u64,
    pub quiz_type: QuizType,
    #[serde(flatten)]
    pub body: QuizBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactQuiz {
    pub id: u64,
    pub real_news_id: u64,
    pub quiz_type: QuizType,
    #[serde(flatten)]
    pub body: QuizBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyQuiz {
    pub id: u64,
    pub today_news_id: u64,
    /// The detail quiz this question was drawn from; never shared between daily sets.
    pub detail_quiz_id: u64,
    pub quiz_type: QuizType,
    #[serde(flatten)]
    pub body: QuizBody,
}

/// Extract the domain name (before .com/.co.kr/etc) from a URL.
///
/// `"https://news.example.co.kr/a/1"` yields `"example"`.
pub fn source_tag(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let parts: Vec<&str> = host.split('.').filter(|p| !p.is_empty()).collect();
    // Second-level country domains ("co.kr", "or.kr", "co.uk") push the name one label left.
    let tld_len = match parts.as_slice() {
        [.., sld, _] if parts.len() >= 3 && matches!(*sld, "co" | "or" | "go" | "ne" | "ac" | "com") => 2,
        _ => 1,
    };
    if parts.len() > tld_len {
        Some(parts[parts.len() - tld_len - 1].to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_serialization() {
        assert_eq!(serde_json::to_string(&NewsCategory::It).unwrap(), "\"IT\"");
        let parsed: NewsCategory = serde_json::from_str("\"SPORTS\"").unwrap();
        assert_eq!(parsed, NewsCategory::NotFiltered);
        assert_eq!(NewsCategory::parse(" economy "), NewsCategory::Economy);
    }

    #[test]
    fn test_keyword_with_type_uses_type_field() {
        let k: KeywordWithType =
            serde_json::from_str(r#"{"keyword": "AI", "type": "BREAKING"}"#).unwrap();
        assert_eq!(k.keyword, "AI");
        assert_eq!(k.keyword_type, KeywordType::Breaking);
    }

    #[test]
    fn test_generated_keywords_flatten() {
        let mut generated = GeneratedKeywords::default();
        generated.by_category.insert(
            NewsCategory::It,
            vec![KeywordWithType {
                keyword: "AI".into(),
                keyword_type: KeywordType::General,
            }],
        );
        let flat = generated.flatten();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].category, NewsCategory::It);
        assert_eq!(generated.len(), 1);
    }

    #[test]
    fn test_quiz_body_validation() {
        let mut body = QuizBody {
            question: "Who?".into(),
            options: vec!["A".into(), "B".into()],
            answer_index: 1,
            explanation: String::new(),
        };
        assert!(body.validate().is_ok());
        body.answer_index = 2;
        assert!(body.validate().is_err());
        body.options = vec!["A".into()];
        body.answer_index = 0;
        assert!(body.validate().is_err());
    }

    #[test]
    fn test_quiz_body_camel_case() {
        let body: QuizBody = serde_json::from_str(
            r#"{"question": "Q", "options": ["a", "b"], "answerIndex": 0}"#,
        )
        .unwrap();
        assert_eq!(body.answer_index, 0);
        assert_eq!(body.explanation, "");
    }

    #[test]
    fn test_source_tag() {
        assert_eq!(source_tag("https://lite.cnn.com/2025/05/06/article"), Some("cnn".into()));
        assert_eq!(source_tag("https://www.hani.co.kr/arti/1.html"), Some("hani".into()));
        assert_eq!(source_tag("https://example.com/article"), Some("example".into()));
        assert_eq!(source_tag("not a url"), None);
    }
}
