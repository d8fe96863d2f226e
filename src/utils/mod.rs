//! 通用工具模块
//!
//! 提供带 TTL 和 LRU 批量驱逐的结果缓存。

pub mod cache_manager;

#[cfg(test)]
mod cache_property_tests;

pub use cache_manager::{CacheEntryMetadata, CacheMetrics, CacheStatistics, ResultCache};
