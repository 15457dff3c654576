//! # News Quiz
//!
//! Collects news for the day's keywords, keeps the highest-scoring articles,
//! and derives a fake counterpart plus detail, fact and daily quizzes from
//! each of them through an OpenAI-compatible LLM API.
//!
//! ## Architecture
//!
//! 1. **Keywords**: generate and filter per-section search keywords
//! 2. **Collection**: rate-limited search, dedup, article crawling
//! 3. **Analysis**: score, categorize, keep the top articles
//! 4. **Cascade**: committed news fan out to fake news and quiz generation
//!    through [`events`] and the bounded [`workers`] pools

pub mod analysis;
pub mod api;
pub mod app;
pub mod cli;
pub mod collection;
pub mod config;
pub mod error;
pub mod events;
pub mod fake_news;
pub mod keywords;
pub mod models;
pub mod outputs;
pub mod pipeline;
pub mod quiz;
pub mod rate_limiter;
pub mod store;
pub mod utils;
pub mod workers;

#[cfg(test)]
pub(crate) mod testing;
