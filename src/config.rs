//! Pipeline configuration loaded from YAML.
//!
//! Every section carries `#[serde(default)]`, so an empty file (or no file at
//! all) yields a usable configuration. Secrets normally come from the
//! environment through the CLI and are layered on top with
//! [`PipelineConfig::with_overrides`].

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub llm: LlmConfig,
    pub naver: NaverConfig,
    pub rate_limit: RateLimitConfig,
    pub keywords: KeywordConfig,
    pub collection: CollectionConfig,
    pub analysis: AnalysisConfig,
    pub quiz: QuizConfig,
    pub pools: PoolsConfig,
}

/// OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".into(),
            api_key: None,
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: 4096,
            request_timeout_secs: 120,
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Date,
    Sim,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Date => "date",
            SortOrder::Sim => "sim",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NaverConfig {
    pub base_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub display: u32,
    pub sort: SortOrder,
}

impl Default for NaverConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openapi.naver.com/v1/search/news.json".into(),
            client_id: None,
            client_secret: None,
            display: 10,
            sort: SortOrder::Date,
        }
    }
}

/// Token bucket guarding the news search API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub capacity: u32,
    pub refill_secs: u64,
    pub poll_interval_ms: u64,
    pub max_wait_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 12,
            refill_secs: 5,
            poll_interval_ms: 2_000,
            max_wait_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn refill_period(&self) -> Duration {
        Duration::from_secs(self.refill_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    pub per_category: usize,
    /// A keyword used this many times inside the window is overused.
    pub overuse_threshold: u32,
    pub overuse_window_days: i64,
    /// How far back "recently used" keywords are shown to the generator.
    pub recent_days: i64,
    pub retention_days: i64,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            per_category: 3,
            overuse_threshold: 3,
            overuse_window_days: 7,
            recent_days: 3,
            retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    pub crawl_concurrency: usize,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            crawl_concurrency: 6,
            request_timeout_secs: 10,
            user_agent: concat!("news_quiz/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorerKind {
    Heuristic,
    Llm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub scorer: ScorerKind,
    pub min_score: i32,
    pub max_selected: usize,
    pub min_content_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            scorer: ScorerKind::Heuristic,
            min_score: 40,
            max_selected: 10,
            min_content_chars: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizConfig {
    pub detail_per_news: usize,
    pub daily_count: usize,
    pub generation_concurrency: usize,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            detail_per_news: 3,
            daily_count: 3,
            generation_concurrency: 2,
        }
    }
}

/// What a pool does with work once its queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Run the job on the submitting task instead of dropping it.
    CallerRuns,
    /// Drop the job and log it.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolsConfig {
    pub news: PoolConfig,
    pub quiz: PoolConfig,
    pub daily: PoolConfig,
    pub shutdown_grace_secs: u64,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            news: PoolConfig {
                workers: 6,
                queue_capacity: 64,
                overflow: OverflowPolicy::CallerRuns,
            },
            quiz: PoolConfig {
                workers: 2,
                queue_capacity: 32,
                overflow: OverflowPolicy::CallerRuns,
            },
            daily: PoolConfig {
                workers: 1,
                queue_capacity: 8,
                overflow: OverflowPolicy::CallerRuns,
            },
            shutdown_grace_secs: 30,
        }
    }
}

impl PoolsConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Values taken from CLI flags or the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub naver_client_id: Option<String>,
    pub naver_client_secret: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_api_base: Option<String>,
}

impl PipelineConfig {
    /// Load from a YAML file, or fall back to defaults when `path` is `None`.
    #[instrument(level = "info", skip_all)]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                let config = Self::from_yaml(&raw)?;
                info!(path = %path.display(), "Loaded configuration");
                config
            }
            None => {
                info!("No config file given; using defaults");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if overrides.naver_client_id.is_some() {
            self.naver.client_id = overrides.naver_client_id;
        }
        if overrides.naver_client_secret.is_some() {
            self.naver.client_secret = overrides.naver_client_secret;
        }
        if overrides.llm_api_key.is_some() {
            self.llm.api_key = overrides.llm_api_key;
        }
        if let Some(base) = overrides.llm_api_base {
            self.llm.api_base = base;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            })
        };
        if self.rate_limit.capacity == 0 {
            return invalid("rate_limit.capacity", "must be at least 1");
        }
        if self.rate_limit.refill_secs == 0 {
            return invalid("rate_limit.refill_secs", "must be at least 1");
        }
        if self.rate_limit.poll_interval() > self.rate_limit.max_wait() {
            return invalid("rate_limit.poll_interval_ms", "must not exceed max_wait_secs");
        }
        for (field, pool) in [
            ("pools.news.workers", &self.pools.news),
            ("pools.quiz.workers", &self.pools.quiz),
            ("pools.daily.workers", &self.pools.daily),
        ] {
            if pool.workers == 0 {
                return invalid(field, "must be at least 1");
            }
        }
        if self.collection.crawl_concurrency == 0 {
            return invalid("collection.crawl_concurrency", "must be at least 1");
        }
        if self.quiz.detail_per_news == 0 {
            return invalid("quiz.detail_per_news", "must be at least 1");
        }
        if !(1..=100).contains(&self.naver.display) {
            return invalid("naver.display", "must be between 1 and 100");
        }
        Ok(())
    }
}
