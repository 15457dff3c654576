use chrono::{Local, NaiveDate};
use clap::Parser;
use news_quiz::app::{App, Collaborators};
use news_quiz::cli::{Cli, Command};
use news_quiz::config::PipelineConfig;
use news_quiz::models::{CategorizedKeyword, KeywordType, KeywordWithType, NewsCategory};
use news_quiz::outputs::json::{load_state, save_state, StateFile, TodayEdition, write_today_edition};
use news_quiz::utils::ensure_writable_dir;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_quiz starting up");

    let args = Cli::parse();
    debug!(config = ?args.config, state = %args.state.display(), command = ?args.command, "Parsed CLI arguments");

    let config = PipelineConfig::load(args.config.as_deref())?.with_overrides(args.overrides());
    let today = Local::now().date_naive();

    // Early check: ensure the edition directory is writable before any work
    if let Command::Today {
        json_output_dir: Some(dir),
        ..
    } = &args.command
    {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(path = %dir, error = %e, "JSON output directory is not writable");
            return Err(e);
        }
    }

    let (store, history) = load_state(&args.state).await?.into_stores();
    let app = App::new(
        config.clone(),
        Collaborators::from_config(&config)?,
        Arc::new(store),
        Arc::new(history),
    )?;

    let outcome = run_command(&app, args.command, today).await;

    if !app.shutdown().await {
        warn!("Shutdown grace period ran out; some generation work was abandoned");
    }
    save_state(&StateFile::capture(app.store(), app.history()), &args.state).await?;

    let elapsed = start_time.elapsed();
    match &outcome {
        Ok(()) => info!(elapsed_secs = elapsed.as_secs_f64(), "news_quiz finished"),
        Err(e) => error!(elapsed_secs = elapsed.as_secs_f64(), error = %e, "news_quiz failed"),
    }
    outcome
}

async fn run_command(
    app: &App,
    command: Command,
    today: NaiveDate,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    match command {
        Command::Run {
            keywords,
            categories,
            date,
            exclusions,
        } => {
            let date = date.unwrap_or(today);
            let report = if keywords.is_empty() {
                app.run_scheduled(date, &exclusions).await?
            } else {
                app.run_for_keywords(manual_keywords(keywords, &categories)?, date)
                    .await?
            };
            info!(
                fetched = report.fetched,
                crawled = report.crawled,
                selected = report.selected,
                persisted = report.persisted.len(),
                failed_keywords = report.failed_keywords.len(),
                "Collection finished"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::SelectToday { id, date } => {
            let selection = app.select_today(id, date.unwrap_or(today))?;
            info!(
                id,
                date = %selection.today.selected_date,
                superseded = ?selection.superseded,
                removed_daily_quizzes = selection.removed_daily_quizzes,
                "Today's news designated"
            );
        }
        Command::Today {
            date,
            json_output_dir,
        } => {
            let today_news = match date {
                Some(date) => app.store().today_news_on(date),
                None => app
                    .store()
                    .today_news_on(today)
                    .or_else(|| app.latest_today_news()),
            };
            let Some(today_news) = today_news else {
                warn!("No today's news designated");
                return Ok(());
            };
            let Some(edition) = TodayEdition::gather(app.store(), today_news.selected_date) else {
                warn!(id = today_news.id, "Designated news no longer exists");
                return Ok(());
            };
            match json_output_dir {
                Some(dir) => {
                    let path = write_today_edition(&edition, &dir).await?;
                    info!(%path, "Edition exported");
                }
                None => println!("{}", serde_json::to_string_pretty(&edition)?),
            }
        }
        Command::Regenerate => {
            // Shutdown waits for the re-triggered jobs before the state is saved
            let missing = app.regenerate_missing();
            println!("{}", serde_json::to_string_pretty(&missing)?);
        }
        Command::PruneKeywords { before } => {
            let cutoff = before.unwrap_or_else(|| app.retention_cutoff(today));
            let removed = app.prune_keyword_history(cutoff);
            info!(%cutoff, removed, "Keyword history pruned");
        }
    }
    Ok(())
}

/// Pair `--keyword` values with the `--category` at the same position.
fn manual_keywords(
    keywords: Vec<String>,
    categories: &[String],
) -> Result<Vec<CategorizedKeyword>, Box<dyn Error + Send + Sync>> {
    keywords
        .into_iter()
        .enumerate()
        .map(|(i, keyword)| -> Result<CategorizedKeyword, Box<dyn Error + Send + Sync>> {
            let category = categories
                .get(i)
                .map(|c| NewsCategory::parse(c))
                .unwrap_or(NewsCategory::It);
            if category == NewsCategory::NotFiltered {
                return Err(format!("unknown category for keyword {keyword:?}: {:?}", categories[i]).into());
            }
            Ok(CategorizedKeyword {
                keyword: KeywordWithType {
                    keyword,
                    keyword_type: KeywordType::General,
                },
                category,
            })
        })
        .collect()
}
