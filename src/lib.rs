//! Sabs 搜索核心
//!
//! 为搜索/排序/过滤提供查询规范化、结果缓存、字段索引、查询计划、防抖调度、
//! 性能监控和条件构建。权威数据源由调用方通过 [`SearchDataSource`] 提供。
//!
//! ```ignore
//! let service = SearchService::start(SearchConfiguration::default())?;
//! let result = service.search(&SearchQuery::text("john"), &source).await?;
//! service.shutdown().await;
//! ```

pub mod error;
pub mod models;
pub mod monitoring;
pub mod services;
pub mod utils;

pub use error::{AppError, DataSourceError, Result};
pub use models::{
    CacheKey, CriteriaSnapshot, FieldCatalog, FieldDefinition, FieldType, FilterMap,
    FilterOperator, FilterValue, Record, SearchConfiguration, SearchQuery, SearchResult,
    SortDirection, SortPreset, SortSpec,
};
pub use monitoring::PerformanceMonitor;
pub use services::{
    CriteriaBuilder, DebounceCoordinator, FieldIndexStore, FnDataSource, QueryPlanner,
    SearchDataSource, SearchService,
};
pub use utils::ResultCache;
