//! Structured generation over an OpenAI-compatible chat API.
//!
//! # Architecture
//!
//! - [`Generator`]: the capability every generating service depends on
//! - [`OpenAiCompatibleClient`]: chat-completions over `reqwest`
//! - [`RetryGenerator`]: decorator adding exponential backoff to any [`Generator`]
//! - [`generate_json`]: typed wrapper that parses the response and re-asks
//!   once when the payload was cut off
//!
//! # Retry Strategy
//!
//! Only transport failures ([`GenerationError::is_transient`]) are retried.
//! The delay doubles from `base_delay`, is capped at `max_delay`, and gets
//! 0-250ms of jitter. A malformed answer is returned to the caller as is.

use crate::config::LlmConfig;
use crate::error::GenerationError;
use crate::utils::{looks_truncated, truncate_for_log};
use async_trait::async_trait;
use rand::{rng, Rng};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Which generation job a prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationTask {
    Keywords,
    Analysis,
    FakeNews,
    DetailQuiz,
    FactQuiz,
}

impl GenerationTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationTask::Keywords => "keywords",
            GenerationTask::Analysis => "analysis",
            GenerationTask::FakeNews => "fake_news",
            GenerationTask::DetailQuiz => "detail_quiz",
            GenerationTask::FactQuiz => "fact_quiz",
        }
    }
}

/// A system instruction plus the task input.
#[derive(Debug, Clone)]
pub struct PromptSpec {
    pub task: GenerationTask,
    pub system: String,
    pub input: String,
}

impl PromptSpec {
    pub fn new(task: GenerationTask, system: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            task,
            system: system.into(),
            input: input.into(),
        }
    }
}

/// Prompt in, raw JSON text out.
///
/// Implementors talk to a model backend or decorate another generator (like
/// [`RetryGenerator`]). Services hold it as `Arc<dyn Generator>`.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Send one prompt and return the model's text.
    ///
    /// # Errors
    ///
    /// [`GenerationError::Unavailable`] or [`GenerationError::Http`] when the
    /// backend could not answer, [`GenerationError::Malformed`] when the answer
    /// had no usable content.
    async fn generate(&self, prompt: &PromptSpec) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Chat-completions client for any OpenAI-compatible server.
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl fmt::Debug for OpenAiCompatibleClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompatibleClient")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiCompatibleClient {
    /// Build a client from the `llm` config section.
    ///
    /// # Errors
    ///
    /// Fails only if the HTTP client cannot be constructed.
    pub fn new(config: &LlmConfig) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl Generator for OpenAiCompatibleClient {
    #[instrument(level = "info", skip_all, fields(task = prompt.task.as_str()))]
    async fn generate(&self, prompt: &PromptSpec) -> Result<String, GenerationError> {
        let t0 = Instant::now();
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.input,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!(
                status = status.as_u16(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                body = %truncate_for_log(&text, 300),
                "Generation API call failed"
            );
            let err = format!("status {}: {}", status.as_u16(), truncate_for_log(&text, 300));
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                GenerationError::Unavailable(err)
            } else {
                GenerationError::Malformed(err)
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| GenerationError::Malformed(format!("chat envelope: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerationError::Malformed("response had no content".into()))?;
        debug!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            bytes = content.len(),
            "Generation API call succeeded"
        );
        Ok(content)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Generator`].
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryGenerator<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T: Generator> RetryGenerator<T> {
    /// Wrap `inner` with retry.
    ///
    /// # Arguments
    ///
    /// * `inner` - The generator to wrap
    /// * `max_retries` - Retries after the first attempt
    /// * `base_delay` - Delay before the first retry (doubles each attempt)
    /// * `max_delay` - Cap on the delay, before jitter
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = OpenAiCompatibleClient::new(&config.llm)?;
    /// let generator = RetryGenerator::new(client, 5, Duration::from_secs(1), Duration::from_secs(30));
    /// ```
    pub fn new(inner: T, max_retries: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(inner: T, config: &LlmConfig) -> Self {
        Self::new(
            inner,
            config.max_retries,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }
}

impl<T> fmt::Debug for RetryGenerator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryGenerator")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

#[async_trait]
impl<T: Generator> Generator for RetryGenerator<T> {
    #[instrument(level = "info", skip_all, fields(task = prompt.task.as_str()))]
    async fn generate(&self, prompt: &PromptSpec) -> Result<String, GenerationError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.generate(prompt).await {
                Ok(resp) => return Ok(resp),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "generate() exhausted retries"
                        );
                        return Err(e);
                    }

                    let shift = u32::try_from(attempt - 1).unwrap_or(u32::MAX).min(16);
                    let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + Duration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64,
                        ?delay,
                        error = %e,
                        "generate() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Drop a surrounding Markdown code fence, if the model added one.
///
/// ```
/// use news_quiz::api::strip_code_fences;
/// assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
/// assert_eq!(strip_code_fences(" [1, 2] "), "[1, 2]");
/// ```
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Ask for JSON and parse it into `T`.
///
/// A response that ends mid-document is re-asked exactly once; any other
/// parse failure is [`GenerationError::Malformed`].
///
/// # Arguments
///
/// * `generator` - Any [`Generator`], usually a [`RetryGenerator`]
/// * `prompt` - The prompt to send
///
/// # Returns
///
/// The parsed value, or the first error that was not recovered from.
pub async fn generate_json<T: DeserializeOwned>(
    generator: &dyn Generator,
    prompt: &PromptSpec,
) -> Result<T, GenerationError> {
    let raw = generator.generate(prompt).await?;
    match serde_json::from_str::<T>(strip_code_fences(&raw)) {
        Ok(value) => Ok(value),
        Err(e) if looks_truncated(&e) => {
            warn!(task = prompt.task.as_str(), error = %e, "EOF while parsing; re-asking once");
            let retry = generator.generate(prompt).await?;
            serde_json::from_str::<T>(strip_code_fences(&retry)).map_err(|e| {
                GenerationError::Malformed(format!(
                    "{e}; response: {}",
                    truncate_for_log(&retry, 300)
                ))
            })
        }
        Err(e) => {
            info!(
                task = prompt.task.as_str(),
                response_preview = %truncate_for_log(&raw, 300),
                "Model returned non-conforming JSON"
            );
            Err(GenerationError::Malformed(e.to_string()))
        }
    }
}
