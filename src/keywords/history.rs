//! Per-day usage ledger of generated keywords.
//!
//! Rows are unique per (keyword, category, date). Recording a keyword that
//! already has a row for that day bumps `use_count` instead of inserting, and
//! both paths run under the write lock so concurrent recorders of the same
//! key are serialised. Keywords compare case-insensitively after trimming.

use crate::models::{KeywordHistory, KeywordWithType, NewsCategory};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

pub fn normalize_keyword(keyword: &str) -> String {
    keyword.trim().to_lowercase()
}

type HistoryKey = (String, NewsCategory, NaiveDate);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryTable {
    next_id: u64,
    rows: BTreeMap<u64, KeywordHistory>,
    #[serde(skip)]
    index: HashMap<HistoryKey, u64>,
}

impl HistoryTable {
    fn key_of(row: &KeywordHistory) -> HistoryKey {
        (normalize_keyword(&row.keyword), row.category, row.used_date)
    }

    fn reindex(&mut self) {
        self.index = self.rows.values().map(|r| (Self::key_of(r), r.id)).collect();
    }
}

#[derive(Debug, Default)]
pub struct KeywordHistoryStore {
    table: RwLock<HistoryTable>,
}

impl KeywordHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(mut table: HistoryTable) -> Self {
        table.reindex();
        Self {
            table: RwLock::new(table),
        }
    }

    pub fn snapshot(&self) -> HistoryTable {
        self.table.read().clone()
    }

    /// Insert a row for (keyword, category, date) or increment the existing one.
    pub fn record(
        &self,
        keyword: &KeywordWithType,
        category: NewsCategory,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> KeywordHistory {
        let mut table = self.table.write();
        let key = (normalize_keyword(&keyword.keyword), category, date);
        if let Some(id) = table.index.get(&key).copied() {
            if let Some(row) = table.rows.get_mut(&id) {
                row.use_count = row.use_count.saturating_add(1);
                debug!(keyword = %row.keyword, %category, use_count = row.use_count, "Keyword use incremented");
                return row.clone();
            }
        }

        table.next_id += 1;
        let row = KeywordHistory {
            id: table.next_id,
            keyword: keyword.keyword.trim().to_string(),
            keyword_type: keyword.keyword_type,
            category,
            used_date: date,
            created_at: now,
            use_count: 1,
        };
        table.index.insert(key, row.id);
        table.rows.insert(row.id, row.clone());
        row
    }

    /// (normalized keyword, category) pairs already recorded on `date`.
    pub fn used_on(&self, date: NaiveDate) -> HashSet<(String, NewsCategory)> {
        self.table
            .read()
            .rows
            .values()
            .filter(|r| r.used_date == date)
            .map(|r| (normalize_keyword(&r.keyword), r.category))
            .collect()
    }

    /// Normalized keywords used at least `threshold` times within `[since, until]`.
    pub fn overused(&self, since: NaiveDate, until: NaiveDate, threshold: u32) -> HashSet<String> {
        let table = self.table.read();
        let mut counts: HashMap<String, u32> = HashMap::new();
        for row in table
            .rows
            .values()
            .filter(|r| r.used_date >= since && r.used_date <= until)
        {
            *counts.entry(normalize_keyword(&row.keyword)).or_default() += row.use_count;
        }
        counts
            .into_iter()
            .filter(|(_, count)| *count >= threshold)
            .map(|(keyword, _)| keyword)
            .collect()
    }

    /// Distinct keywords used within `[since, until]`, most recent first.
    pub fn recent(&self, since: NaiveDate, until: NaiveDate) -> Vec<KeywordWithType> {
        let table = self.table.read();
        let mut rows: Vec<&KeywordHistory> = table
            .rows
            .values()
            .filter(|r| r.used_date >= since && r.used_date <= until)
            .collect();
        rows.sort_by(|a, b| b.used_date.cmp(&a.used_date).then(b.id.cmp(&a.id)));

        let mut seen = HashSet::new();
        rows.into_iter()
            .filter(|r| seen.insert(normalize_keyword(&r.keyword)))
            .map(|r| KeywordWithType {
                keyword: r.keyword.clone(),
                keyword_type: r.keyword_type,
            })
            .collect()
    }

    /// Delete rows used before `cutoff`; returns how many were removed.
    pub fn prune_before(&self, cutoff: NaiveDate) -> usize {
        let mut table = self.table.write();
        let before = table.rows.len();
        table.rows.retain(|_, r| r.used_date >= cutoff);
        let removed = before - table.rows.len();
        table.reindex();
        info!(%cutoff, removed, "Pruned keyword history");
        removed
    }

    pub fn len(&self) -> usize {
        self.table.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
