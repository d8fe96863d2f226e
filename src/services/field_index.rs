//! 字段倒排索引
//!
//! 每个可索引字段维护一个 `值 -> 记录 ID 集合` 的映射，随结果数据增量构建。
//! 查找是对所有不同值的大小写不敏感子串扫描，值基数预期在数百量级。

use crate::models::config::IndexConfig;
use crate::models::{stringify_value, Record};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

/// 每个值字符串字节的近似开销
const BYTES_PER_VALUE_CHAR: usize = 2;
/// 每个记录 ID 的近似开销
const BYTES_PER_ID: usize = 8;

/// 单个字段的索引
#[derive(Debug)]
struct FieldIndex {
    values: HashMap<String, HashSet<String>>,
    total_entries: u64,
    last_updated: Instant,
    approx_memory_bytes: usize,
}

impl FieldIndex {
    fn new() -> Self {
        Self {
            values: HashMap::new(),
            total_entries: 0,
            last_updated: Instant::now(),
            approx_memory_bytes: 0,
        }
    }

    fn insert(&mut self, value: String, id: &str) {
        let value_len = value.len();
        let bucket = self.values.entry(value).or_insert_with(|| {
            self.approx_memory_bytes += value_len * BYTES_PER_VALUE_CHAR;
            HashSet::new()
        });
        if bucket.insert(id.to_string()) {
            self.total_entries += 1;
            self.approx_memory_bytes += BYTES_PER_ID;
        }
    }

    fn clear(&mut self) {
        self.values.clear();
        self.total_entries = 0;
        self.approx_memory_bytes = 0;
    }
}

/// 字段索引统计信息
#[derive(Debug, Clone, Serialize)]
pub struct FieldIndexStats {
    pub field: String,
    pub distinct_values: usize,
    pub total_entries: u64,
    pub approx_memory_bytes: usize,
    /// 距离上次更新的毫秒数
    pub idle_ms: u64,
}

/// 字段索引集合
pub struct FieldIndexStore {
    indexes: RwLock<HashMap<String, FieldIndex>>,
    staleness: Duration,
}

impl FieldIndexStore {
    pub fn new(config: &IndexConfig) -> Self {
        let indexes = config
            .indexable_fields
            .iter()
            .map(|field| (field.clone(), FieldIndex::new()))
            .collect();

        Self {
            indexes: RwLock::new(indexes),
            staleness: config.staleness(),
        }
    }

    /// 用新到的记录更新索引
    ///
    /// 没有 `id` 的记录和值为 null 的字段会被跳过
    pub fn update(&self, records: &[Record]) {
        if records.is_empty() {
            return;
        }

        let now = Instant::now();
        let mut indexes = self.indexes.write();

        for record in records {
            let Some(id) = record.id() else {
                continue;
            };

            for (field, index) in indexes.iter_mut() {
                let Some(value) = record.get(field).and_then(stringify_value) else {
                    continue;
                };
                index.insert(value, &id);
                index.last_updated = now;
            }
        }

        tracing::trace!(records = records.len(), "Field index updated");
    }

    /// 查找包含该词（大小写不敏感子串）的所有记录 ID
    pub fn lookup(&self, term: &str) -> HashSet<String> {
        let needle = term.trim().to_lowercase();
        let mut matches = HashSet::new();
        if needle.is_empty() {
            return matches;
        }

        let indexes = self.indexes.read();
        for index in indexes.values() {
            for (value, ids) in &index.values {
                if value.to_lowercase().contains(&needle) {
                    matches.extend(ids.iter().cloned());
                }
            }
        }

        matches
    }

    /// 清空超过过期窗口未更新的索引内容（保留结构），返回被清空的字段数
    pub fn clear_if_stale(&self) -> usize {
        let now = Instant::now();
        let mut indexes = self.indexes.write();
        let mut cleared = 0;

        for (field, index) in indexes.iter_mut() {
            if index.values.is_empty() {
                continue;
            }
            if now.duration_since(index.last_updated) >= self.staleness {
                index.clear();
                cleared += 1;
                tracing::debug!(field = %field, "Cleared stale field index");
            }
        }

        cleared
    }

    /// 清空所有索引内容
    pub fn clear(&self) {
        for index in self.indexes.write().values_mut() {
            index.clear();
        }
    }

    /// 所有字段的索引统计，按字段名排序
    pub fn stats(&self) -> Vec<FieldIndexStats> {
        let now = Instant::now();
        let indexes = self.indexes.read();
        let mut stats: Vec<FieldIndexStats> = indexes
            .iter()
            .map(|(field, index)| FieldIndexStats {
                field: field.clone(),
                distinct_values: index.values.len(),
                total_entries: index.total_entries,
                approx_memory_bytes: index.approx_memory_bytes,
                idle_ms: now.duration_since(index.last_updated).as_millis() as u64,
            })
            .collect();
        stats.sort_by(|a, b| a.field.cmp(&b.field));
        stats
    }

    /// 所有索引的近似内存占用
    pub fn approx_memory_bytes(&self) -> usize {
        self.indexes
            .read()
            .values()
            .map(|index| index.approx_memory_bytes)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> FieldIndexStore {
        FieldIndexStore::new(&IndexConfig::default())
    }

    fn record(value: serde_json::Value) -> Record {
        Record::from(value)
    }

    #[test]
    fn test_lookup_is_case_insensitive_substring() {
        let index = store();
        index.update(&[record(json!({"id": "a", "name": "Alice Example"}))]);

        let ids = index.lookup("alice");
        assert!(ids.contains("a"));
        assert!(index.lookup("EXAMP").contains("a"));
        assert!(index.lookup("bob").is_empty());
    }

    #[test]
    fn test_lookup_unions_across_fields() {
        let index = store();
        index.update(&[
            record(json!({"id": 1, "name": "Loan review"})),
            record(json!({"id": 2, "status": "pending review"})),
            record(json!({"id": 3, "assignee": "Kofi"})),
        ]);

        let ids = index.lookup("review");
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("1"));
        assert!(ids.contains("2"));
    }

    #[test]
    fn test_non_indexed_and_null_fields_ignored() {
        let index = store();
        index.update(&[
            record(json!({"id": "x", "notes": "alice"})),
            record(json!({"id": "y", "name": null})),
            record(json!({"name": "no id alice"})),
        ]);

        assert!(index.lookup("alice").is_empty());
    }

    #[test]
    fn test_empty_term_matches_nothing() {
        let index = store();
        index.update(&[record(json!({"id": "a", "name": "Alice"}))]);
        assert!(index.lookup("   ").is_empty());
    }

    #[test]
    fn test_stats_track_entries_and_memory() {
        let index = store();
        index.update(&[
            record(json!({"id": "a", "name": "Alice"})),
            record(json!({"id": "a", "name": "Alice"})),
            record(json!({"id": "b", "name": "Alice"})),
        ]);

        let stats = index.stats();
        let name = stats.iter().find(|s| s.field == "name").unwrap();
        assert_eq!(name.distinct_values, 1);
        assert_eq!(name.total_entries, 2);
        assert_eq!(
            name.approx_memory_bytes,
            "Alice".len() * BYTES_PER_VALUE_CHAR + 2 * BYTES_PER_ID
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_index_is_cleared_but_kept() {
        let index = FieldIndexStore::new(&IndexConfig {
            staleness_ms: 1_000,
            ..IndexConfig::default()
        });
        index.update(&[record(json!({"id": "a", "name": "Alice", "status": "open"}))]);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(index.clear_if_stale(), 0);

        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(index.clear_if_stale(), 3);
        assert!(index.lookup("alice").is_empty());
        assert_eq!(index.approx_memory_bytes(), 0);

        // 结构保留，可以继续更新
        index.update(&[record(json!({"id": "b", "name": "Bob"}))]);
        assert!(index.lookup("bob").contains("b"));
    }
}
