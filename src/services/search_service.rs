//! 搜索服务
//!
//! 持有缓存、字段索引、性能监控、计划器和防抖协调器，并负责后台维护任务的生命周期。
//! 在应用启动时创建一次，通过引用注入给使用方。

use crate::error::{AppError, Result};
use crate::models::config::SearchConfiguration;
use crate::models::criteria::FieldCatalog;
use crate::models::{SearchQuery, SearchResult};
use crate::monitoring::PerformanceMonitor;
use crate::services::criteria_builder::CriteriaBuilder;
use crate::services::data_source::SearchDataSource;
use crate::services::debounce::DebounceCoordinator;
use crate::services::field_index::FieldIndexStore;
use crate::services::query_planner::QueryPlanner;
use crate::utils::cache_manager::ResultCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use validator::Validate;

/// 一次维护清理的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub expired_entries: usize,
    pub cleared_fields: usize,
}

/// 搜索服务
pub struct SearchService {
    config: SearchConfiguration,
    cache: Arc<ResultCache>,
    index: Arc<FieldIndexStore>,
    monitor: Arc<PerformanceMonitor>,
    planner: Arc<QueryPlanner>,
    debounce: DebounceCoordinator,
    shutdown_token: CancellationToken,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl SearchService {
    /**
     * 启动服务
     *
     * 校验配置、创建共享结构并启动后台维护任务，必须在 tokio 运行时中调用
     */
    pub fn start(config: SearchConfiguration) -> Result<Self> {
        config
            .validate()
            .map_err(|e| AppError::config_error(e.to_string()))?;

        let cache = Arc::new(ResultCache::new(&config.cache));
        let index = Arc::new(FieldIndexStore::new(&config.index));
        let monitor = Arc::new(PerformanceMonitor::new(config.monitor.clone()));
        let planner = Arc::new(QueryPlanner::new(
            Arc::clone(&cache),
            Arc::clone(&index),
            Arc::clone(&monitor),
            config.planner.clone(),
        ));
        let debounce = DebounceCoordinator::new(Arc::clone(&planner), config.debounce.delay());
        let shutdown_token = CancellationToken::new();

        let handle = Self::spawn_maintenance(
            Arc::clone(&cache),
            Arc::clone(&index),
            &config,
            shutdown_token.clone(),
        );

        info!(
            cache_max_size = config.cache.max_size,
            cache_ttl_ms = config.cache.ttl_ms,
            debounce_ms = config.debounce.delay_ms,
            sweep_interval_ms = config.maintenance.sweep_interval_ms,
            "Search service started"
        );

        Ok(Self {
            config,
            cache,
            index,
            monitor,
            planner,
            debounce,
            shutdown_token,
            maintenance: Mutex::new(Some(handle)),
        })
    }

    fn spawn_maintenance(
        cache: Arc<ResultCache>,
        index: Arc<FieldIndexStore>,
        config: &SearchConfiguration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let period = config.maintenance.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 第一次 tick 立即完成
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = Self::sweep(&cache, &index);
                        if report != MaintenanceReport::default() {
                            debug!(
                                expired_entries = report.expired_entries,
                                cleared_fields = report.cleared_fields,
                                "Maintenance sweep"
                            );
                        }
                    }
                }
            }

            debug!("Maintenance task stopped");
        })
    }

    fn sweep(cache: &ResultCache, index: &FieldIndexStore) -> MaintenanceReport {
        MaintenanceReport {
            expired_entries: cache.evict_expired(),
            cleared_fields: index.clear_if_stale(),
        }
    }

    /// 立即执行一次维护清理
    pub fn run_maintenance(&self) -> MaintenanceReport {
        Self::sweep(&self.cache, &self.index)
    }

    /// 不经防抖直接执行查询
    pub async fn search(
        &self,
        query: &SearchQuery,
        source: &dyn SearchDataSource,
    ) -> Result<Arc<SearchResult>> {
        self.planner.execute(query, source).await
    }

    /// 经防抖协调器调度查询
    pub fn schedule(
        &self,
        search_id: impl Into<String>,
        query: SearchQuery,
        source: Arc<dyn SearchDataSource>,
    ) -> impl Future<Output = Result<Arc<SearchResult>>> + Send + 'static {
        self.debounce.schedule(search_id, query, source)
    }

    /// 使用配置中的容量上限创建条件构建器
    pub fn criteria_builder(&self, catalog: FieldCatalog) -> CriteriaBuilder {
        CriteriaBuilder::new(catalog, self.config.criteria.clone())
    }

    pub fn config(&self) -> &SearchConfiguration {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn index(&self) -> &Arc<FieldIndexStore> {
        &self.index
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn debounce(&self) -> &DebounceCoordinator {
        &self.debounce
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown_token.is_cancelled()
    }

    /**
     * 关闭服务
     *
     * 停止后台维护任务并取消所有待触发的防抖搜索。已在执行中的数据源调用不受影响。
     * 重复调用是安全的。
     */
    pub async fn shutdown(&self) {
        if self.shutdown_token.is_cancelled() {
            return;
        }
        self.shutdown_token.cancel();
        let pending = self.debounce.pending_count();
        self.debounce.shutdown();

        let handle = self.maintenance.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Maintenance task ended abnormally");
            }
        }

        info!(cancelled_searches = pending, "Search service stopped");
    }
}

impl Drop for SearchService {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
        self.debounce.shutdown();
    }
}
