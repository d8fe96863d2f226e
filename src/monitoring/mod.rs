/*!
 * 监控模块
 *
 * 提供查询性能追踪和日志初始化
 */
pub mod logging;
pub mod performance_tracker;

pub use logging::init_tracing;
pub use performance_tracker::{
    MetricStats, PerformanceAlert, PerformanceMonitor, PerformanceReport, PerformanceSample,
    SlowQuery, SEARCH_METRIC,
};
