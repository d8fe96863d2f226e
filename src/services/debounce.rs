//! 搜索防抖协调器
//!
//! 每个 search_id 同一时间最多一个待触发的计时器。静默期内的新请求会取消旧计时器，
//! 旧调用以 `AppError::Superseded` 结束；计时器触发后执行不再响应取消。

use crate::error::{AppError, Result};
use crate::models::{SearchQuery, SearchResult};
use crate::services::data_source::SearchDataSource;
use crate::services::query_planner::QueryPlanner;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct PendingSearch {
    generation: u64,
    token: CancellationToken,
}

/// 防抖协调器
pub struct DebounceCoordinator {
    planner: Arc<QueryPlanner>,
    delay: Duration,
    pending: Arc<Mutex<HashMap<String, PendingSearch>>>,
    generation: AtomicU64,
    /// 关闭时取消，所有计时器令牌都是它的子令牌
    root_token: CancellationToken,
}

impl DebounceCoordinator {
    pub fn new(planner: Arc<QueryPlanner>, delay: Duration) -> Self {
        Self {
            planner,
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            root_token: CancellationToken::new(),
        }
    }

    /**
     * 调度一次防抖搜索
     *
     * 计时器在调用时立即注册，返回的 future 无需被轮询即可生效。
     *
     * # 返回
     * * `Ok(Arc<SearchResult>)` - 本次调用是静默期内的最后一次，执行成功
     * * `Err(AppError::Superseded)` - 被同 id 的后续调用取代，或协调器已关闭
     * * `Err(AppError::DataSource)` - 执行时数据源失败
     */
    pub fn schedule(
        &self,
        search_id: impl Into<String>,
        query: SearchQuery,
        source: Arc<dyn SearchDataSource>,
    ) -> impl Future<Output = Result<Arc<SearchResult>>> + Send + 'static {
        let search_id = search_id.into();
        let (tx, rx) = oneshot::channel();

        if self.root_token.is_cancelled() {
            debug!(search_id = %search_id, "Coordinator shut down, dropping search");
            drop(tx);
            return Self::resolve(search_id, rx);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = self.root_token.child_token();

        {
            let mut pending = self.pending.lock();
            let previous = pending.insert(
                search_id.clone(),
                PendingSearch {
                    generation,
                    token: token.clone(),
                },
            );
            if let Some(previous) = previous {
                previous.token.cancel();
                debug!(search_id = %search_id, "Superseded pending search");
            }
        }

        let planner = Arc::clone(&self.planner);
        let pending = Arc::clone(&self.pending);
        let delay = self.delay;
        let task_id = search_id.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            {
                let mut pending = pending.lock();
                match pending.get(&task_id) {
                    Some(entry) if entry.generation == generation => {
                        pending.remove(&task_id);
                    }
                    _ => return,
                }
            }

            debug!(search_id = %task_id, generation = generation, "Debounce window elapsed");
            let result = planner.execute(&query, source.as_ref()).await;
            // 调用方可能已放弃等待
            let _ = tx.send(result);
        });

        Self::resolve(search_id, rx)
    }

    async fn resolve(
        search_id: String,
        rx: oneshot::Receiver<Result<Arc<SearchResult>>>,
    ) -> Result<Arc<SearchResult>> {
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(AppError::superseded(search_id)),
        }
    }

    /// 取消某个 id 尚未触发的计时器，返回是否存在
    pub fn cancel(&self, search_id: &str) -> bool {
        match self.pending.lock().remove(search_id) {
            Some(entry) => {
                entry.token.cancel();
                debug!(search_id = search_id, "Pending search cancelled");
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// 取消所有尚未触发的计时器，协调器仍可继续使用
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<PendingSearch> = {
            let mut pending = self.pending.lock();
            pending.drain().map(|(_, entry)| entry).collect()
        };
        for entry in &drained {
            entry.token.cancel();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "Cancelled pending searches");
        }
        drained.len()
    }

    /// 永久关闭：取消所有计时器，之后的调度立即以 Superseded 结束
    pub fn shutdown(&self) {
        self.root_token.cancel();
        self.pending.lock().clear();
    }

    pub fn is_shut_down(&self) -> bool {
        self.root_token.is_cancelled()
    }
}
