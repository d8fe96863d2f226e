//! 搜索结果缓存
//!
//! 提供有界、带 TTL 的结果缓存，包括：
//! - 以归一化查询键为索引的 L1 内存缓存（`lru` 维护访问顺序）
//! - 从插入时刻开始计算的固定 TTL
//! - 容量满时按最近最少访问批量驱逐
//! - 基于执行序号的过期写入保护
//! - 命中/未命中/驱逐指标

use crate::models::config::CacheConfig;
use crate::models::{CacheKey, SearchResult};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// 序号历史容量相对于条目容量的倍数
const SEQUENCE_HISTORY_FACTOR: usize = 8;

/// 缓存条目
#[derive(Debug, Clone)]
struct CacheEntry {
    result: Arc<SearchResult>,
    created_at: Instant,
    last_accessed_at: Instant,
    access_count: u64,
    /// 写入该条目的执行序号
    sequence: u64,
}

/// 条目元数据（只读视图，不影响访问顺序）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntryMetadata {
    pub created_at: Instant,
    pub last_accessed_at: Instant,
    pub access_count: u64,
    pub sequence: u64,
}

/// 缓存性能指标追踪器
#[derive(Debug, Default)]
pub struct CacheMetrics {
    pub hit_count: AtomicU64,
    pub miss_count: AtomicU64,
    /// 容量驱逐次数（按条目计）
    pub eviction_count: AtomicU64,
    /// TTL 过期移除次数
    pub expired_count: AtomicU64,
    /// 被序号保护拒绝的写入次数
    pub rejected_write_count: AtomicU64,
}

impl CacheMetrics {
    fn reset(&self) {
        self.hit_count.store(0, Ordering::Relaxed);
        self.miss_count.store(0, Ordering::Relaxed);
        self.eviction_count.store(0, Ordering::Relaxed);
        self.expired_count.store(0, Ordering::Relaxed);
        self.rejected_write_count.store(0, Ordering::Relaxed);
    }
}

/// 缓存统计快照
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheStatistics {
    pub entry_count: usize,
    pub max_size: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    pub hit_rate: f64,
    pub eviction_count: u64,
    pub expired_count: u64,
    pub rejected_write_count: u64,
}

/// 结果缓存
///
/// 纯建议性：随时可以清空，不影响结果正确性
pub struct ResultCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    /// 每个键最近接受的写入序号，条目被驱逐或过期后仍保留
    sequences: Mutex<LruCache<CacheKey, u64>>,
    max_size: usize,
    ttl: Duration,
    eviction_batch: usize,
    metrics: CacheMetrics,
}

impl ResultCache {
    /// 使用配置创建缓存
    pub fn new(config: &CacheConfig) -> Self {
        let max_size = config.max_size.max(1);
        let eviction_batch = ((max_size as f64 * config.eviction_ratio).ceil() as usize).max(1);
        let sequence_capacity = max_size
            .checked_mul(SEQUENCE_HISTORY_FACTOR)
            .and_then(NonZeroUsize::new)
            .unwrap_or(NonZeroUsize::MAX);

        Self {
            entries: Mutex::new(LruCache::unbounded()),
            sequences: Mutex::new(LruCache::new(sequence_capacity)),
            max_size,
            ttl: config.ttl(),
            eviction_batch,
            metrics: CacheMetrics::default(),
        }
    }

    /// 获取缓存结果
    ///
    /// 命中时更新访问计数和最近访问时间；过期条目视为未命中并删除
    pub fn get(&self, key: &CacheKey) -> Option<Arc<SearchResult>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let expired = match entries.peek(key) {
            Some(entry) => now.duration_since(entry.created_at) >= self.ttl,
            None => {
                self.metrics.miss_count.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if expired {
            entries.pop(key);
            self.metrics.expired_count.fetch_add(1, Ordering::Relaxed);
            self.metrics.miss_count.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "Cache entry expired on access");
            return None;
        }

        let entry = entries.get_mut(key)?;
        entry.access_count += 1;
        entry.last_accessed_at = now;
        self.metrics.hit_count.fetch_add(1, Ordering::Relaxed);
        Some(Arc::clone(&entry.result))
    }

    /// 无条件写入（覆盖已有条目）
    pub fn put(&self, key: CacheKey, result: impl Into<Arc<SearchResult>>) {
        let mut entries = self.entries.lock();
        let sequence = entries.peek(&key).map(|e| e.sequence).unwrap_or(0);
        self.insert_locked(&mut entries, key, result.into(), sequence);
    }

    /// 带执行序号的写入
    ///
    /// 如果该键曾接受过更新的序号（即使条目已被驱逐或过期），拒绝写入并返回 false
    pub fn put_with_sequence(
        &self,
        key: CacheKey,
        result: impl Into<Arc<SearchResult>>,
        sequence: u64,
    ) -> bool {
        // 锁顺序：entries -> sequences
        let mut entries = self.entries.lock();
        let mut sequences = self.sequences.lock();

        let latest = sequences
            .get(&key)
            .copied()
            .into_iter()
            .chain(entries.peek(&key).map(|e| e.sequence))
            .max();

        if let Some(latest) = latest {
            if latest > sequence {
                self.metrics
                    .rejected_write_count
                    .fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    key = %key,
                    latest_sequence = latest,
                    sequence = sequence,
                    "Rejected stale cache write"
                );
                return false;
            }
        }

        sequences.put(key.clone(), sequence);
        drop(sequences);
        self.insert_locked(&mut entries, key, result.into(), sequence);
        true
    }

    fn insert_locked(
        &self,
        entries: &mut LruCache<CacheKey, CacheEntry>,
        key: CacheKey,
        result: Arc<SearchResult>,
        sequence: u64,
    ) {
        if !entries.contains(&key) && entries.len() >= self.max_size {
            let mut evicted = 0;
            while evicted < self.eviction_batch {
                if entries.pop_lru().is_none() {
                    break;
                }
                evicted += 1;
            }
            self.metrics
                .eviction_count
                .fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::debug!(
                evicted = evicted,
                max_size = self.max_size,
                "Evicted least recently accessed cache entries"
            );
        }

        let now = Instant::now();
        entries.put(
            key,
            CacheEntry {
                result,
                created_at: now,
                last_accessed_at: now,
                access_count: 0,
                sequence,
            },
        );
    }

    /// 清理所有已过期条目，返回清理数量
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let expired_keys: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.created_at) >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            entries.pop(key);
        }

        let removed = expired_keys.len();
        if removed > 0 {
            self.metrics
                .expired_count
                .fetch_add(removed as u64, Ordering::Relaxed);
            tracing::debug!(removed = removed, "Swept expired cache entries");
        }
        removed
    }

    /// 基于条件的缓存失效
    pub fn invalidate_if<F>(&self, predicate: F) -> usize
    where
        F: Fn(&CacheKey, &SearchResult) -> bool,
    {
        let mut entries = self.entries.lock();

        let keys_to_invalidate: Vec<CacheKey> = entries
            .iter()
            .filter(|(key, entry)| predicate(key, &entry.result))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys_to_invalidate {
            entries.pop(key);
        }

        tracing::debug!(
            invalidated_count = keys_to_invalidate.len(),
            "Conditionally invalidated cache entries"
        );
        keys_to_invalidate.len()
    }

    /// 读取条目元数据，不改变访问顺序
    pub fn entry_metadata(&self, key: &CacheKey) -> Option<CacheEntryMetadata> {
        self.entries.lock().peek(key).map(|entry| CacheEntryMetadata {
            created_at: entry.created_at,
            last_accessed_at: entry.last_accessed_at,
            access_count: entry.access_count,
            sequence: entry.sequence,
        })
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// 清空缓存和指标
    ///
    /// 序号历史保留，清空后迟到的旧写入仍会被拒绝
    pub fn clear(&self) {
        self.entries.lock().clear();
        self.metrics.reset();
        tracing::info!("Result cache cleared");
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStatistics {
        let hit_count = self.metrics.hit_count.load(Ordering::Relaxed);
        let miss_count = self.metrics.miss_count.load(Ordering::Relaxed);
        let total = hit_count + miss_count;

        CacheStatistics {
            entry_count: self.len(),
            max_size: self.max_size,
            hit_count,
            miss_count,
            hit_rate: if total > 0 {
                hit_count as f64 / total as f64
            } else {
                0.0
            },
            eviction_count: self.metrics.eviction_count.load(Ordering::Relaxed),
            expired_count: self.metrics.expired_count.load(Ordering::Relaxed),
            rejected_write_count: self.metrics.rejected_write_count.load(Ordering::Relaxed),
        }
    }
}
