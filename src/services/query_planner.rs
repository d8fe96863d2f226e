use crate::error::{AppError, Result};
use crate::models::config::PlannerConfig;
use crate::models::{CacheKey, SearchQuery, SearchResult};
use crate::monitoring::{PerformanceMonitor, PerformanceSample};
use crate::services::data_source::SearchDataSource;
use crate::services::field_index::FieldIndexStore;
use crate::services::query_normalizer::{normalize, normalized_value};
use crate::utils::cache_manager::ResultCache;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// 索引辅助改写时注入的过滤字段
pub const IDS_FILTER: &str = "ids";

/**
 * 查询计划器
 *
 * 决定请求是直接命中缓存、借助字段索引缩小范围，还是原样交给权威数据源。
 * 缓存、索引和监控由外部注入并在所有搜索之间共享。
 */
pub struct QueryPlanner {
    cache: Arc<ResultCache>,
    index: Arc<FieldIndexStore>,
    monitor: Arc<PerformanceMonitor>,
    config: PlannerConfig,
    /// 单调递增的执行序号，用于拒绝过期的缓存写入
    sequence: AtomicU64,
}

impl QueryPlanner {
    pub fn new(
        cache: Arc<ResultCache>,
        index: Arc<FieldIndexStore>,
        monitor: Arc<PerformanceMonitor>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            cache,
            index,
            monitor,
            config,
            sequence: AtomicU64::new(0),
        }
    }

    /**
     * 构建未命中缓存时的执行计划
     *
     * 纯自由文本查询会尝试用字段索引把文本改写为 `ids` 过滤；
     * 候选集为空或达到上限时原样透传。
     */
    pub fn build_plan(&self, query: &SearchQuery) -> ExecutionPlan {
        let key = normalize(query);

        if !self.config.index_assist_enabled || !query.is_pure_text() {
            return ExecutionPlan::pass_through(key, query);
        }

        let candidates = self.index.lookup(&query.text);
        if candidates.is_empty() || candidates.len() >= self.config.max_candidate_ids {
            debug!(
                candidates = candidates.len(),
                ceiling = self.config.max_candidate_ids,
                "Index yielded no usable candidates"
            );
            return ExecutionPlan::pass_through(key, query);
        }

        let mut ids: Vec<String> = candidates.into_iter().collect();
        ids.sort();
        let candidate_count = ids.len();
        let rewritten = query.with_text("").with_filter(IDS_FILTER, json!(ids));

        ExecutionPlan {
            key,
            strategy: PlanStrategy::IndexAssisted { candidate_count },
            query: rewritten,
        }
    }

    /**
     * 执行查询
     *
     * # 返回
     * * `Ok(Arc<SearchResult>)` - 命中缓存或数据源返回的结果
     * * `Err(AppError::DataSource)` - 数据源失败，原始错误作为 source 保留
     */
    pub async fn execute(
        &self,
        query: &SearchQuery,
        source: &dyn SearchDataSource,
    ) -> Result<Arc<SearchResult>> {
        let started = Instant::now();
        let key = normalize(query);

        if let Some(hit) = self.cache.get(&key) {
            self.monitor.record_sample(Self::sample(&key, started, true), None);
            debug!(key = %key, "Search served from cache");
            return Ok(hit);
        }

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let plan = self.build_plan(query);
        debug!(
            key = %key,
            sequence = sequence,
            strategy = ?plan.strategy,
            "Cache miss, fetching from data source"
        );

        let fetched = source.fetch(plan.query).await;
        let sample = Self::sample(&key, started, false);

        match fetched {
            Ok(mut result) => {
                result.execution_time_ms = sample.execution_time_ms;
                let result = Arc::new(result);

                let accepted = self
                    .cache
                    .put_with_sequence(plan.key, Arc::clone(&result), sequence);
                if !accepted {
                    debug!(sequence = sequence, "Newer result already cached, kept it");
                }
                self.index.update(&result.records);
                self.monitor.record_sample(sample, Some(normalized_value(query)));

                Ok(result)
            }
            Err(e) => {
                warn!(
                    key = %key,
                    duration_ms = sample.execution_time_ms,
                    error = %e,
                    "Data source fetch failed"
                );
                self.monitor.record_sample(sample, Some(normalized_value(query)));
                Err(AppError::data_source(e))
            }
        }
    }

    fn sample(key: &CacheKey, started: Instant, was_cache_hit: bool) -> PerformanceSample {
        PerformanceSample {
            query_fingerprint: key.to_string(),
            execution_time_ms: started.elapsed().as_millis() as u64,
            was_cache_hit,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/**
 * 执行计划
 */
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    /// 原始（改写前）查询的缓存键
    pub key: CacheKey,
    pub strategy: PlanStrategy,
    /// 实际发送给数据源的查询
    pub query: SearchQuery,
}

impl ExecutionPlan {
    fn pass_through(key: CacheKey, query: &SearchQuery) -> Self {
        Self {
            key,
            strategy: PlanStrategy::PassThrough,
            query: query.clone(),
        }
    }
}

/**
 * 计划策略
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStrategy {
    PassThrough,
    IndexAssisted { candidate_count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataSourceError;
    use crate::models::config::{CacheConfig, IndexConfig, MonitorConfig};
    use crate::models::Record;
    use crate::services::data_source::FnDataSource;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Fixture {
        planner: QueryPlanner,
        cache: Arc<ResultCache>,
        index: Arc<FieldIndexStore>,
        monitor: Arc<PerformanceMonitor>,
    }

    fn fixture(config: PlannerConfig) -> Fixture {
        let cache = Arc::new(ResultCache::new(&CacheConfig::default()));
        let index = Arc::new(FieldIndexStore::new(&IndexConfig::default()));
        let monitor = Arc::new(PerformanceMonitor::new(MonitorConfig::default()));
        let planner = QueryPlanner::new(
            Arc::clone(&cache),
            Arc::clone(&index),
            Arc::clone(&monitor),
            config,
        );
        Fixture {
            planner,
            cache,
            index,
            monitor,
        }
    }

    fn people() -> Vec<Record> {
        vec![
            Record::from(json!({"id": "1", "name": "John Mensah", "status": "active"})),
            Record::from(json!({"id": "2", "name": "Johnny Owusu", "status": "pending"})),
            Record::from(json!({"id": "3", "name": "Ama Boateng", "status": "active"})),
        ]
    }

    /// 记录收到的查询并返回固定数据
    fn recording_source(seen: Arc<Mutex<Vec<SearchQuery>>>) -> impl SearchDataSource {
        FnDataSource::new(move |query: SearchQuery| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().push(query.clone());
                Ok::<_, DataSourceError>(SearchResult::for_query(&query, people(), 3))
            }
        })
    }

    #[tokio::test]
    async fn test_second_identical_query_hits_cache() {
        let fx = fixture(PlannerConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let source = recording_source(Arc::clone(&seen));
        let query = SearchQuery::text("john");

        let first = fx.planner.execute(&query, &source).await.unwrap();
        let second = fx.planner.execute(&query, &source).await.unwrap();

        assert_eq!(seen.lock().len(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!((fx.monitor.cache_hit_rate() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_results_feed_the_index() {
        let fx = fixture(PlannerConfig::default());
        let source = recording_source(Arc::new(Mutex::new(Vec::new())));

        fx.planner
            .execute(&SearchQuery::default(), &source)
            .await
            .unwrap();

        assert!(fx.index.lookup("ama").contains("3"));
    }

    #[tokio::test]
    async fn test_pure_text_query_is_rewritten_with_index_candidates() {
        let fx = fixture(PlannerConfig::default());
        fx.index.update(&people());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let source = recording_source(Arc::clone(&seen));
        let query = SearchQuery::text("John");

        fx.planner.execute(&query, &source).await.unwrap();

        let sent = seen.lock()[0].clone();
        assert_eq!(sent.text, "");
        assert_eq!(sent.filters.get(IDS_FILTER), Some(&json!(["1", "2"])));
        // 缓存键使用改写前的查询
        assert!(fx.cache.contains(&normalize(&query)));
        assert!(!fx.cache.contains(&normalize(&sent)));
    }

    #[tokio::test]
    async fn test_structured_query_is_not_rewritten() {
        let fx = fixture(PlannerConfig::default());
        fx.index.update(&people());
        let query = SearchQuery::text("john").with_filter("status", json!("active"));

        let plan = fx.planner.build_plan(&query);
        assert_eq!(plan.strategy, PlanStrategy::PassThrough);
        assert_eq!(plan.query, query);
    }

    #[tokio::test]
    async fn test_candidate_ceiling_disables_rewrite() {
        let fx = fixture(PlannerConfig {
            max_candidate_ids: 2,
            ..PlannerConfig::default()
        });
        fx.index.update(&people());

        let plan = fx.planner.build_plan(&SearchQuery::text("john"));
        assert_eq!(plan.strategy, PlanStrategy::PassThrough);

        let plan = fx.planner.build_plan(&SearchQuery::text("ama"));
        assert_eq!(
            plan.strategy,
            PlanStrategy::IndexAssisted { candidate_count: 1 }
        );
    }

    #[tokio::test]
    async fn test_no_candidates_passes_through() {
        let fx = fixture(PlannerConfig::default());
        let plan = fx.planner.build_plan(&SearchQuery::text("nobody"));
        assert_eq!(plan.strategy, PlanStrategy::PassThrough);
        assert_eq!(plan.query.text, "nobody");
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates_and_caches_nothing() {
        let fx = fixture(PlannerConfig::default());
        let source = FnDataSource::new(|_query: SearchQuery| async move {
            Err::<SearchResult, DataSourceError>(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "backend timed out",
            )))
        });
        let query = SearchQuery::text("john");

        let err = fx.planner.execute(&query, &source).await.unwrap_err();

        match &err {
            AppError::DataSource(inner) => {
                let io = inner.downcast_ref::<std::io::Error>().unwrap();
                assert_eq!(io.kind(), std::io::ErrorKind::TimedOut);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(fx.cache.is_empty());
        let samples = fx.monitor.recent_samples();
        assert_eq!(samples.len(), 1);
        assert!(!samples[0].was_cache_hit);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execution_time_is_stamped() {
        let fx = fixture(PlannerConfig::default());
        let source = FnDataSource::new(|query: SearchQuery| async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            Ok::<_, DataSourceError>(SearchResult::for_query(&query, vec![], 0))
        });

        let result = fx
            .planner
            .execute(&SearchQuery::default(), &source)
            .await
            .unwrap();
        assert!(result.execution_time_ms >= 250);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_superseded_fetch_does_not_overwrite_newer_result() {
        let fx = Arc::new(fixture(PlannerConfig::default()));
        let calls = Arc::new(AtomicUsize::new(0));
        let source = {
            let calls = Arc::clone(&calls);
            Arc::new(FnDataSource::new(move |query: SearchQuery| {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    // 第一次调用更慢，晚于第二次返回
                    let delay = if call == 0 { 500 } else { 100 };
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    Ok::<_, DataSourceError>(SearchResult::for_query(&query, vec![], call as u64))
                }
            }))
        };
        let query = SearchQuery::default().with_filter("status", json!("open"));

        let slow = {
            let fx = Arc::clone(&fx);
            let source = Arc::clone(&source);
            let query = query.clone();
            tokio::spawn(async move { fx.planner.execute(&query, source.as_ref()).await })
        };
        tokio::task::yield_now().await;
        let fast = fx.planner.execute(&query, source.as_ref()).await.unwrap();
        let slow = slow.await.unwrap().unwrap();

        assert_eq!(fast.total, 1);
        assert_eq!(slow.total, 0);
        let cached = fx.cache.get(&normalize(&query)).unwrap();
        assert_eq!(cached.total, 1);
        assert_eq!(fx.cache.stats().rejected_write_count, 1);
    }
}
