//! Key-indexed tables for articles, designations and quizzes.
//!
//! Every public method that mutates takes the write lock once and either
//! applies all of its changes or none of them, so each call is one committed
//! unit of work. Uniqueness rules live here rather than in the services:
//!
//! - one RealNews per `original_url` and per `link`
//! - one FakeNews per RealNews id
//! - one TodayNews per date and per RealNews id
//! - each quiz set is inserted once per owner
//! - a DetailQuiz feeds at most one DailyQuiz

use crate::error::StoreError;
use crate::models::{
    AnalyzedNews, DailyQuiz, DetailQuiz, FactQuiz, FakeNews, QuizBody, QuizType, RealNews,
    TodayNews,
};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsTables {
    next_real_news_id: u64,
    next_quiz_id: u64,
    real_news: BTreeMap<u64, RealNews>,
    fake_news: BTreeMap<u64, FakeNews>,
    today_news: BTreeMap<u64, TodayNews>,
    detail_quizzes: BTreeMap<u64, DetailQuiz>,
    fact_quizzes: BTreeMap<u64, FactQuiz>,
    daily_quizzes: BTreeMap<u64, DailyQuiz>,
}

impl NewsTables {
    fn quiz_id(&mut self) -> u64 {
        self.next_quiz_id += 1;
        self.next_quiz_id
    }

    /// Remove the designation and its daily quizzes; returns the quizzes removed.
    fn remove_today(&mut self, id: u64) -> usize {
        self.today_news.remove(&id);
        let before = self.daily_quizzes.len();
        self.daily_quizzes.retain(|_, q| q.today_news_id != id);
        before - self.daily_quizzes.len()
    }
}

/// RealNews ids still lacking generated content, each list in id order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MissingGeneration {
    pub fake_news: Vec<u64>,
    pub detail_quizzes: Vec<u64>,
    pub fact_quizzes: Vec<u64>,
}

impl MissingGeneration {
    pub fn is_empty(&self) -> bool {
        self.fake_news.is_empty() && self.detail_quizzes.is_empty() && self.fact_quizzes.is_empty()
    }

    /// Every id that lacks something, sorted and without repeats.
    pub fn ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .fake_news
            .iter()
            .chain(&self.detail_quizzes)
            .chain(&self.fact_quizzes)
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Outcome of designating today's news.
#[derive(Debug, Clone, PartialEq)]
pub struct TodaySelection {
    pub today: TodayNews,
    /// RealNews ids whose designation was replaced.
    pub superseded: Vec<u64>,
    pub removed_daily_quizzes: usize,
}

#[derive(Debug, Default)]
pub struct NewsStore {
    tables: RwLock<NewsTables>,
}

impl NewsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables(tables: NewsTables) -> Self {
        Self {
            tables: RwLock::new(tables),
        }
    }

    pub fn snapshot(&self) -> NewsTables {
        self.tables.read().clone()
    }

    // ---- real news ----

    /// Every link and original URL already persisted.
    pub fn known_urls(&self) -> HashSet<String> {
        let tables = self.tables.read();
        tables
            .real_news
            .values()
            .flat_map(|n| [n.link.clone(), n.original_url.clone()])
            .collect()
    }

    /// Persist a selection in one unit of work, skipping articles already stored.
    pub fn insert_real_news(&self, batch: Vec<AnalyzedNews>, now: DateTime<Utc>) -> Vec<RealNews> {
        let mut tables = self.tables.write();
        let mut seen: HashSet<String> = tables
            .real_news
            .values()
            .flat_map(|n| [n.link.clone(), n.original_url.clone()])
            .collect();

        let mut inserted = Vec::with_capacity(batch.len());
        for analyzed in batch {
            let c = analyzed.candidate;
            if seen.contains(&c.link) || seen.contains(&c.original_url) {
                debug!(link = %c.link, "Real news already stored; skipping");
                continue;
            }
            seen.insert(c.link.clone());
            seen.insert(c.original_url.clone());

            tables.next_real_news_id += 1;
            let news = RealNews {
                id: tables.next_real_news_id,
                title: c.title,
                content: c.content,
                description: c.description,
                link: c.link,
                image_url: c.image_url,
                origin_created_date: c.origin_created_date,
                created_date: now,
                media_name: c.media_name,
                journalist: c.journalist,
                original_url: c.original_url,
                category: analyzed.category,
            };
            tables.real_news.insert(news.id, news.clone());
            inserted.push(news);
        }
        info!(count = inserted.len(), "Committed real news batch");
        inserted
    }

    pub fn real_news(&self, id: u64) -> Option<RealNews> {
        self.tables.read().real_news.get(&id).cloned()
    }

    pub fn real_news_many(&self, ids: &[u64]) -> Vec<RealNews> {
        let tables = self.tables.read();
        ids.iter()
            .filter_map(|id| tables.real_news.get(id).cloned())
            .collect()
    }

    pub fn real_news_count(&self) -> usize {
        self.tables.read().real_news.len()
    }

    /// Scan every RealNews for a missing FakeNews, detail quiz set or fact quiz set.
    pub fn missing_generation(&self) -> MissingGeneration {
        let tables = self.tables.read();
        let with_detail: HashSet<u64> = tables.detail_quizzes.values().map(|q| q.real_news_id).collect();
        let with_fact: HashSet<u64> = tables.fact_quizzes.values().map(|q| q.real_news_id).collect();

        let mut missing = MissingGeneration::default();
        for &id in tables.real_news.keys() {
            if !tables.fake_news.contains_key(&id) {
                missing.fake_news.push(id);
            }
            if !with_detail.contains(&id) {
                missing.detail_quizzes.push(id);
            }
            if !with_fact.contains(&id) {
                missing.fact_quizzes.push(id);
            }
        }
        missing
    }

    // ---- fake news ----

    /// Which of `ids` already own a FakeNews row, in one lookup.
    pub fn fake_news_ids_among(&self, ids: &[u64]) -> HashSet<u64> {
        let tables = self.tables.read();
        ids.iter()
            .copied()
            .filter(|id| tables.fake_news.contains_key(id))
            .collect()
    }

    pub fn insert_fake_news(&self, fake: FakeNews) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if !tables.real_news.contains_key(&fake.id) {
            return Err(StoreError::NotFound {
                entity: "real news",
                id: fake.id,
            });
        }
        if tables.fake_news.contains_key(&fake.id) {
            return Err(StoreError::AlreadyExists {
                entity: "fake news",
                key: fake.id.to_string(),
            });
        }
        tables.fake_news.insert(fake.id, fake);
        Ok(())
    }

    pub fn fake_news(&self, id: u64) -> Option<FakeNews> {
        self.tables.read().fake_news.get(&id).cloned()
    }

    pub fn fake_news_count(&self) -> usize {
        self.tables.read().fake_news.len()
    }

    // ---- detail quizzes ----

    pub fn has_detail_quizzes(&self, real_news_id: u64) -> bool {
        self.tables
            .read()
            .detail_quizzes
            .values()
            .any(|q| q.real_news_id == real_news_id)
    }

    pub fn detail_quizzes_for(&self, real_news_id: u64) -> Vec<DetailQuiz> {
        self.tables
            .read()
            .detail_quizzes
            .values()
            .filter(|q| q.real_news_id == real_news_id)
            .cloned()
            .collect()
    }

    pub fn insert_detail_quizzes(
        &self,
        real_news_id: u64,
        bodies: Vec<QuizBody>,
    ) -> Result<Vec<DetailQuiz>, StoreError> {
        let mut tables = self.tables.write();
        if !tables.real_news.contains_key(&real_news_id) {
            return Err(StoreError::NotFound {
                entity: "real news",
                id: real_news_id,
            });
        }
        if tables
            .detail_quizzes
            .values()
            .any(|q| q.real_news_id == real_news_id)
        {
            return Err(StoreError::AlreadyExists {
                entity: "detail quiz set",
                key: real_news_id.to_string(),
            });
        }
        let mut inserted = Vec::with_capacity(bodies.len());
        for body in bodies {
            let quiz = DetailQuiz {
                id: tables.quiz_id(),
                real_news_id,
                quiz_type: QuizType::Detail,
                body,
            };
            tables.detail_quizzes.insert(quiz.id, quiz.clone());
            inserted.push(quiz);
        }
        Ok(inserted)
    }

    // ---- fact quizzes ----

    pub fn has_fact_quizzes(&self, real_news_id: u64) -> bool {
        self.tables
            .read()
            .fact_quizzes
            .values()
            .any(|q| q.real_news_id == real_news_id)
    }

    pub fn fact_quizzes_for(&self, real_news_id: u64) -> Vec<FactQuiz> {
        self.tables
            .read()
            .fact_quizzes
            .values()
            .filter(|q| q.real_news_id == real_news_id)
            .cloned()
            .collect()
    }

    pub fn insert_fact_quizzes(
        &self,
        real_news_id: u64,
        bodies: Vec<QuizBody>,
    ) -> Result<Vec<FactQuiz>, StoreError> {
        let mut tables = self.tables.write();
        if !tables.fake_news.contains_key(&real_news_id) {
            return Err(StoreError::NotFound {
                entity: "fake news",
                id: real_news_id,
            });
        }
        if tables
            .fact_quizzes
            .values()
            .any(|q| q.real_news_id == real_news_id)
        {
            return Err(StoreError::AlreadyExists {
                entity: "fact quiz set",
                key: real_news_id.to_string(),
            });
        }
        let mut inserted = Vec::with_capacity(bodies.len());
        for body in bodies {
            let quiz = FactQuiz {
                id: tables.quiz_id(),
                real_news_id,
                quiz_type: QuizType::Fact,
                body,
            };
            tables.fact_quizzes.insert(quiz.id, quiz.clone());
            inserted.push(quiz);
        }
        Ok(inserted)
    }

    // ---- today's news ----

    /// Designate `real_news_id` for `date`, replacing whatever held that date.
    ///
    /// The previous holder of the date loses its designation and its daily
    /// quizzes in the same unit of work. An article already designated on a
    /// different date is moved rather than duplicated.
    pub fn select_today_news(
        &self,
        real_news_id: u64,
        date: NaiveDate,
    ) -> Result<TodaySelection, StoreError> {
        let mut tables = self.tables.write();
        if !tables.real_news.contains_key(&real_news_id) {
            return Err(StoreError::NotFound {
                entity: "real news",
                id: real_news_id,
            });
        }
        if let Some(current) = tables.today_news.get(&real_news_id) {
            if current.selected_date == date {
                return Err(StoreError::AlreadyExists {
                    entity: "today news",
                    key: date.to_string(),
                });
            }
        }

        let superseded: Vec<u64> = tables
            .today_news
            .values()
            .filter(|t| t.selected_date == date || t.id == real_news_id)
            .map(|t| t.id)
            .collect();
        let removed_daily_quizzes: usize = superseded.iter().map(|id| tables.remove_today(*id)).sum();

        let today = TodayNews {
            id: real_news_id,
            selected_date: date,
        };
        tables.today_news.insert(real_news_id, today.clone());
        info!(
            id = real_news_id,
            %date,
            ?superseded,
            removed_daily_quizzes,
            "Today's news designated"
        );
        Ok(TodaySelection {
            today,
            superseded,
            removed_daily_quizzes,
        })
    }

    pub fn today_news(&self, id: u64) -> Option<TodayNews> {
        self.tables.read().today_news.get(&id).cloned()
    }

    pub fn today_news_on(&self, date: NaiveDate) -> Option<TodayNews> {
        self.tables
            .read()
            .today_news
            .values()
            .find(|t| t.selected_date == date)
            .cloned()
    }

    pub fn latest_today_news(&self) -> Option<TodayNews> {
        self.tables
            .read()
            .today_news
            .values()
            .max_by_key(|t| t.selected_date)
            .cloned()
    }

    pub fn today_news_count_on(&self, date: NaiveDate) -> usize {
        self.tables
            .read()
            .today_news
            .values()
            .filter(|t| t.selected_date == date)
            .count()
    }

    // ---- daily quizzes ----

    pub fn has_daily_quizzes(&self, today_news_id: u64) -> bool {
        self.tables
            .read()
            .daily_quizzes
            .values()
            .any(|q| q.today_news_id == today_news_id)
    }

    pub fn used_detail_quiz_ids(&self) -> HashSet<u64> {
        self.tables
            .read()
            .daily_quizzes
            .values()
            .map(|q| q.detail_quiz_id)
            .collect()
    }

    pub fn daily_quizzes_for(&self, today_news_id: u64) -> Vec<DailyQuiz> {
        self.tables
            .read()
            .daily_quizzes
            .values()
            .filter(|q| q.today_news_id == today_news_id)
            .cloned()
            .collect()
    }

    pub fn daily_quiz_count(&self) -> usize {
        self.tables.read().daily_quizzes.len()
    }

    pub fn insert_daily_quizzes(
        &self,
        today_news_id: u64,
        picks: Vec<DetailQuiz>,
    ) -> Result<Vec<DailyQuiz>, StoreError> {
        let mut tables = self.tables.write();
        if !tables.today_news.contains_key(&today_news_id) {
            return Err(StoreError::NotFound {
                entity: "today news",
                id: today_news_id,
            });
        }
        if tables
            .daily_quizzes
            .values()
            .any(|q| q.today_news_id == today_news_id)
        {
            return Err(StoreError::AlreadyExists {
                entity: "daily quiz set",
                key: today_news_id.to_string(),
            });
        }
        let used: HashSet<u64> = tables.daily_quizzes.values().map(|q| q.detail_quiz_id).collect();
        if let Some(reused) = picks.iter().find(|p| used.contains(&p.id)) {
            return Err(StoreError::Conflict(format!(
                "detail quiz {} already used in a daily quiz",
                reused.id
            )));
        }

        let mut inserted = Vec::with_capacity(picks.len());
        for pick in picks {
            let quiz = DailyQuiz {
                id: tables.quiz_id(),
                today_news_id,
                detail_quiz_id: pick.id,
                quiz_type: QuizType::Daily,
                body: pick.body,
            };
            tables.daily_quizzes.insert(quiz.id, quiz.clone());
            inserted.push(quiz);
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{analyzed, quiz_body};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn store_with(n: usize) -> (NewsStore, Vec<RealNews>) {
        let store = NewsStore::new();
        let batch = (0..n).map(|i| analyzed(i, 80)).collect();
        let inserted = store.insert_real_news(batch, Utc::now());
        (store, inserted)
    }

    #[test]
    fn test_insert_real_news_skips_known_urls() {
        let (store, first) = store_with(2);
        assert_eq!(first.len(), 2);
        let again = store.insert_real_news(vec![analyzed(1, 80), analyzed(5, 80)], Utc::now());
        assert_eq!(again.len(), 1);
        assert_eq!(store.real_news_count(), 3);
        assert!(store.known_urls().contains(&first[0].link));
    }

    #[test]
    fn test_insert_real_news_skips_duplicates_within_batch() {
        let store = NewsStore::new();
        let inserted = store.insert_real_news(vec![analyzed(1, 80), analyzed(1, 70)], Utc::now());
        assert_eq!(inserted.len(), 1);
    }

    #[test]
    fn test_fake_news_is_unique_per_real_news() {
        let (store, news) = store_with(1);
        let id = news[0].id;
        store
            .insert_fake_news(FakeNews { id, content: "first".into() })
            .unwrap();
        let err = store
            .insert_fake_news(FakeNews { id, content: "second".into() })
            .unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(store.fake_news(id).unwrap().content, "first");
        assert_eq!(store.fake_news_ids_among(&[id, 999]), HashSet::from([id]));
    }

    #[test]
    fn test_fake_news_requires_real_news() {
        let store = NewsStore::new();
        let err = store
            .insert_fake_news(FakeNews { id: 42, content: "x".into() })
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id: 42, .. }));
    }

    #[test]
    fn test_detail_quiz_set_inserted_once() {
        let (store, news) = store_with(1);
        let id = news[0].id;
        let quizzes = store
            .insert_detail_quizzes(id, vec![quiz_body(1), quiz_body(2)])
            .unwrap();
        assert_eq!(quizzes.len(), 2);
        assert!(store.has_detail_quizzes(id));
        assert!(store.insert_detail_quizzes(id, vec![quiz_body(3)]).is_err());
        assert_eq!(store.detail_quizzes_for(id).len(), 2);
    }

    #[test]
    fn test_missing_generation_lists_gaps_per_kind() {
        let (store, news) = store_with(3);
        let (a, b, c) = (news[0].id, news[1].id, news[2].id);
        for id in [a, b] {
            store
                .insert_fake_news(FakeNews { id, content: "x".into() })
                .unwrap();
            store.insert_detail_quizzes(id, vec![quiz_body(1)]).unwrap();
        }
        store.insert_fact_quizzes(a, vec![quiz_body(2)]).unwrap();

        let missing = store.missing_generation();
        assert_eq!(missing.fake_news, vec![c]);
        assert_eq!(missing.detail_quizzes, vec![c]);
        assert_eq!(missing.fact_quizzes, vec![b, c]);
        assert_eq!(missing.ids(), vec![b, c]);

        store
            .insert_fake_news(FakeNews { id: c, content: "x".into() })
            .unwrap();
        store.insert_detail_quizzes(c, vec![quiz_body(3)]).unwrap();
        store.insert_fact_quizzes(b, vec![quiz_body(4)]).unwrap();
        store.insert_fact_quizzes(c, vec![quiz_body(5)]).unwrap();
        assert!(store.missing_generation().is_empty());
    }

    #[test]
    fn test_fact_quizzes_require_fake_news() {
        let (store, news) = store_with(1);
        let id = news[0].id;
        assert!(store.insert_fact_quizzes(id, vec![quiz_body(1)]).is_err());
        store
            .insert_fake_news(FakeNews { id, content: "x".into() })
            .unwrap();
        assert_eq!(store.insert_fact_quizzes(id, vec![quiz_body(1)]).unwrap().len(), 1);
        assert!(store.has_fact_quizzes(id));
    }

    #[test]
    fn test_select_today_supersedes_same_date() {
        let (store, news) = store_with(2);
        let (a, b) = (news[0].id, news[1].id);
        store.select_today_news(a, date(18)).unwrap();
        let picks = store.insert_detail_quizzes(a, vec![quiz_body(1), quiz_body(2)]).unwrap();
        store.insert_daily_quizzes(a, picks).unwrap();
        assert_eq!(store.daily_quiz_count(), 2);

        let selection = store.select_today_news(b, date(18)).unwrap();
        assert_eq!(selection.superseded, vec![a]);
        assert_eq!(selection.removed_daily_quizzes, 2);
        assert_eq!(store.today_news_count_on(date(18)), 1);
        assert_eq!(store.today_news_on(date(18)).unwrap().id, b);
        assert!(store.daily_quizzes_for(a).is_empty());
        assert!(store.today_news(a).is_none());
    }

    #[test]
    fn test_select_today_moves_designation_between_dates() {
        let (store, news) = store_with(1);
        let id = news[0].id;
        store.select_today_news(id, date(17)).unwrap();
        store.select_today_news(id, date(18)).unwrap();
        assert!(store.today_news_on(date(17)).is_none());
        assert_eq!(store.latest_today_news().unwrap().selected_date, date(18));
        assert!(store.select_today_news(id, date(18)).unwrap_err().is_already_exists());
    }

    #[test]
    fn test_select_today_unknown_id() {
        let store = NewsStore::new();
        assert!(matches!(
            store.select_today_news(9, date(18)),
            Err(StoreError::NotFound { id: 9, .. })
        ));
    }

    #[test]
    fn test_daily_quiz_rejects_reused_detail_quiz() {
        let (store, news) = store_with(2);
        let (a, b) = (news[0].id, news[1].id);
        let picks = store.insert_detail_quizzes(a, vec![quiz_body(1)]).unwrap();
        store.select_today_news(a, date(17)).unwrap();
        store.select_today_news(b, date(18)).unwrap();
        store.insert_daily_quizzes(a, picks.clone()).unwrap();
        assert!(matches!(
            store.insert_daily_quizzes(b, picks),
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.used_detail_quiz_ids().len(), 1);
    }

    #[test]
    fn test_tables_round_trip_through_json() {
        let (store, news) = store_with(1);
        store
            .insert_fake_news(FakeNews { id: news[0].id, content: "fake".into() })
            .unwrap();
        let json = serde_json::to_string(&store.snapshot()).unwrap();
        let restored = NewsStore::from_tables(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.real_news(news[0].id), Some(news[0].clone()));
        let more = restored.insert_real_news(vec![analyzed(9, 80)], Utc::now());
        assert_eq!(more[0].id, news[0].id + 1);
    }
}
