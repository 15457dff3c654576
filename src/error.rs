//! Error types for every stage of the pipeline.
//!
//! Each concern owns one enum. Stage-level enums wrap the lower ones with
//! `#[from]` so `?` carries the original cause up to the caller that decides
//! whether the failure drops one item or aborts the operation.

use std::time::Duration;
use thiserror::Error;

/// Configuration could not be read or is internally inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// No rate-limit token became available before the wait ceiling.
#[derive(Debug, Error)]
#[error("rate limiter gave up after waiting {waited:?}")]
pub struct RateLimitTimeout {
    pub waited: Duration,
}

/// Failures of the structured-generation capability.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Transport or upstream failure; worth retrying with backoff.
    #[error("generation backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered, but not with the structure we asked for.
    #[error("malformed generation response: {0}")]
    Malformed(String),

    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl GenerationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GenerationError::Unavailable(_) | GenerationError::Http(_))
    }
}

/// Failures while searching for or crawling articles.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error(transparent)]
    RateLimited(#[from] RateLimitTimeout),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("news API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse news API response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("scrape failed for {url}: {reason}")]
    ScrapeFailed { url: String, reason: String },
}

/// Integrity and lookup failures raised at the storage boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} already exists for {key}")]
    AlreadyExists { entity: &'static str, key: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

#[derive(Debug, Error)]
pub enum KeywordError {
    #[error("keyword generation failed: {0}")]
    Generation(#[from] GenerationError),
}

#[derive(Debug, Error)]
pub enum QuizError {
    #[error("quiz generation failed for real news {id}: {source}")]
    Generation {
        id: u64,
        #[source]
        source: GenerationError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Top-level failure of a triggered pipeline operation.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Keyword(#[from] KeywordError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// The pool refused the job or dropped it before it reported back.
    #[error("{0} pool did not run the job")]
    JobLost(&'static str),
}
