//! JSON files: the persisted pipeline state and today's edition.
//!
//! # Output Structure
//!
//! ```text
//! state.json                    # both stores, loaded at start, saved at exit
//!
//! json_output_dir/
//! └── 2026-10-18/
//!     └── today.json            # designated article, its fake twin, daily quizzes
//! ```

use crate::keywords::history::{HistoryTable, KeywordHistoryStore};
use crate::models::{DailyQuiz, FakeNews, RealNews, TodayNews};
use crate::store::{NewsStore, NewsTables};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateFile {
    pub news: NewsTables,
    pub keyword_history: HistoryTable,
}

impl StateFile {
    pub fn capture(store: &NewsStore, history: &KeywordHistoryStore) -> Self {
        Self {
            news: store.snapshot(),
            keyword_history: history.snapshot(),
        }
    }

    pub fn into_stores(self) -> (NewsStore, KeywordHistoryStore) {
        (
            NewsStore::from_tables(self.news),
            KeywordHistoryStore::from_table(self.keyword_history),
        )
    }
}

/// Read the state file; a missing file is an empty state.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_state(path: &Path) -> Result<StateFile, Box<dyn Error + Send + Sync>> {
    match fs::read_to_string(path).await {
        Ok(raw) => {
            let state: StateFile = serde_json::from_str(&raw)?;
            info!(bytes = raw.len(), "Loaded state");
            Ok(state)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No state file yet; starting empty");
            Ok(StateFile::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// Write the state file through a temporary sibling, then rename over it.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn save_state(state: &StateFile, path: &Path) -> Result<(), Box<dyn Error + Send + Sync>> {
    let json = serde_json::to_string_pretty(state)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &json).await?;
    fs::rename(&tmp, path).await?;
    info!(bytes = json.len(), "Saved state");
    Ok(())
}

/// Everything published for one date.
#[derive(Debug, Clone, Serialize)]
pub struct TodayEdition {
    pub date: NaiveDate,
    pub today: TodayNews,
    pub real_news: RealNews,
    pub fake_news: Option<FakeNews>,
    pub daily_quizzes: Vec<DailyQuiz>,
}

impl TodayEdition {
    pub fn gather(store: &NewsStore, date: NaiveDate) -> Option<Self> {
        let today = store.today_news_on(date)?;
        let real_news = store.real_news(today.id)?;
        Some(Self {
            date,
            fake_news: store.fake_news(today.id),
            daily_quizzes: store.daily_quizzes_for(today.id),
            today,
            real_news,
        })
    }
}

/// Write an edition to `{json_output_dir}/{date}/today.json`.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir))]
pub async fn write_today_edition(
    edition: &TodayEdition,
    json_output_dir: &str,
) -> Result<String, Box<dyn Error + Send + Sync>> {
    let json = serde_json::to_string(edition)?;

    let full_json_dir = format!("{}/{}", json_output_dir.trim_end_matches('/'), edition.date);
    info!(%full_json_dir, "Ensuring JSON directory exists");
    if let Err(e) = fs::create_dir_all(&full_json_dir).await {
        error!(%full_json_dir, error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let output_json_filename = format!("{full_json_dir}/today.json");
    fs::write(&output_json_filename, json).await?;
    info!(path = %output_json_filename, "Wrote today's edition");
    Ok(output_json_filename)
}
