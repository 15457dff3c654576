//! Command-line interface definitions.
//!
//! Global options point at the config and state files; credentials can be
//! given as flags or through the environment and override the YAML values.

use crate::config::ConfigOverrides;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// # Examples
///
/// ```sh
/// # Generate today's keywords and run the whole pipeline
/// news_quiz --config config.yaml run
///
/// # Collect for explicit keywords
/// news_quiz run --keyword AI --category it --keyword 금리 --category economy
///
/// # Designate today's news and export the edition
/// news_quiz select-today --id 42
/// news_quiz today --json-output-dir ./json
///
/// # Retry generation that failed in earlier runs
/// news_quiz regenerate
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to config.yaml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// State file carried between runs
    #[arg(short, long, global = true, default_value = "news_quiz_state.json")]
    pub state: PathBuf,

    #[arg(long, env = "NAVER_CLIENT_ID", global = true, hide_env_values = true)]
    pub naver_client_id: Option<String>,

    #[arg(long, env = "NAVER_CLIENT_SECRET", global = true, hide_env_values = true)]
    pub naver_client_secret: Option<String>,

    #[arg(long, env = "LLM_API_KEY", global = true, hide_env_values = true)]
    pub llm_api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API
    #[arg(long, env = "LLM_API_BASE", global = true)]
    pub llm_api_base: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Collect, analyse and persist news, then generate fake news and quizzes
    Run {
        /// Search keyword; when none is given keywords are generated
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,

        /// Section for the keyword at the same position (default: it)
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Run date (default: today, local time)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Keywords the generator must not return
        #[arg(short, long = "exclude")]
        exclusions: Vec<String>,
    },

    /// Designate a real news item as today's news
    SelectToday {
        #[arg(long)]
        id: u64,

        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Show today's (or the latest) designation and optionally export it
    Today {
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Output directory for the JSON edition file
        #[arg(short, long)]
        json_output_dir: Option<String>,
    },

    /// Retry fake news and quiz generation for articles still missing them
    Regenerate,

    /// Delete keyword history older than the cutoff
    PruneKeywords {
        /// Cutoff date (default: today minus keywords.retention_days)
        #[arg(short, long)]
        before: Option<NaiveDate>,
    },
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            naver_client_id: self.naver_client_id.clone(),
            naver_client_secret: self.naver_client_secret.clone(),
            llm_api_key: self.llm_api_key.clone(),
            llm_api_base: self.llm_api_base.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_with_keywords() {
        let cli = Cli::parse_from([
            "news_quiz",
            "--config",
            "config.yaml",
            "run",
            "--keyword",
            "AI",
            "--category",
            "it",
            "-k",
            "금리",
            "--date",
            "2026-10-18",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("config.yaml")));
        assert_eq!(cli.state, PathBuf::from("news_quiz_state.json"));
        assert_eq!(
            cli.command,
            Command::Run {
                keywords: vec!["AI".into(), "금리".into()],
                categories: vec!["it".into()],
                date: NaiveDate::from_ymd_opt(2026, 10, 18),
                exclusions: vec![],
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["news_quiz", "select-today", "--id", "7", "--state", "/tmp/s.json"]);
        assert_eq!(cli.state, PathBuf::from("/tmp/s.json"));
        assert_eq!(cli.command, Command::SelectToday { id: 7, date: None });
    }

    #[test]
    fn test_today_and_prune() {
        let cli = Cli::parse_from(["news_quiz", "today", "-j", "./json"]);
        assert_eq!(
            cli.command,
            Command::Today {
                date: None,
                json_output_dir: Some("./json".into())
            }
        );
        let cli = Cli::parse_from(["news_quiz", "prune-keywords", "--before", "2026-09-01"]);
        assert_eq!(
            cli.command,
            Command::PruneKeywords {
                before: NaiveDate::from_ymd_opt(2026, 9, 1)
            }
        );
    }

    #[test]
    fn test_regenerate_takes_no_arguments() {
        let cli = Cli::parse_from(["news_quiz", "regenerate"]);
        assert_eq!(cli.command, Command::Regenerate);
        assert!(Cli::try_parse_from(["news_quiz", "regenerate", "--id", "3"]).is_err());
    }

    #[test]
    fn test_overrides_from_flags() {
        let cli = Cli::parse_from(["news_quiz", "--llm-api-base", "http://localhost:8080/v1", "today"]);
        assert_eq!(
            cli.overrides().llm_api_base.as_deref(),
            Some("http://localhost:8080/v1")
        );
    }
}
