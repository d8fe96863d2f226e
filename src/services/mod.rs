//! 搜索核心服务
//!
//! 查询规范化、字段索引、查询计划、防抖调度和条件构建，以及把它们组装在一起的搜索服务。

pub mod criteria_builder;
pub mod data_source;
pub mod debounce;
pub mod field_index;
pub mod query_normalizer;
pub mod query_planner;
pub mod search_service;

pub use criteria_builder::{ChangeHandler, CriteriaBuilder};
pub use data_source::{FnDataSource, SearchDataSource};
pub use debounce::DebounceCoordinator;
pub use field_index::{FieldIndexStats, FieldIndexStore};
pub use query_normalizer::{normalize, normalized_value};
pub use query_planner::{ExecutionPlan, PlanStrategy, QueryPlanner, IDS_FILTER};
pub use search_service::{MaintenanceReport, SearchService};
