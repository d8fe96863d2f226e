//! 搜索核心配置模块
//!
//! 提供配置驱动的服务创建，支持：
//! - TOML/JSON 配置文件加载
//! - `SABS_SEARCH__*` 环境变量覆盖
//! - 开发和生产环境的默认配置
//! - 配置验证和错误处理

use crate::error::EyreResult;
use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "SABS_SEARCH";

/// 搜索核心配置
///
/// 所有参数都有默认值，可在构造时覆盖
#[derive(Default, Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SearchConfiguration {
    /// 结果缓存配置
    #[serde(default)]
    #[validate(nested)]
    pub cache: CacheConfig,
    /// 字段索引配置
    #[serde(default)]
    #[validate(nested)]
    pub index: IndexConfig,
    /// 查询计划配置
    #[serde(default)]
    #[validate(nested)]
    pub planner: PlannerConfig,
    /// 防抖配置
    #[serde(default)]
    #[validate(nested)]
    pub debounce: DebounceConfig,
    /// 性能监控配置
    #[serde(default)]
    #[validate(nested)]
    pub monitor: MonitorConfig,
    /// 条件构建器配置
    #[serde(default)]
    #[validate(nested)]
    pub criteria: CriteriaConfig,
    /// 后台维护配置
    #[serde(default)]
    #[validate(nested)]
    pub maintenance: MaintenanceConfig,
    /// 日志配置
    #[serde(default)]
    #[validate(nested)]
    pub logging: LoggingConfig,
}

/// 结果缓存配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CacheConfig {
    /// 最大缓存条目数
    #[serde(default = "default_cache_max_size")]
    #[validate(range(min = 1))]
    pub max_size: usize,
    /// TTL（毫秒），从插入时开始计算
    #[serde(default = "default_cache_ttl_ms")]
    #[validate(range(min = 1))]
    pub ttl_ms: u64,
    /// 容量满时一次驱逐的比例
    #[serde(default = "default_eviction_ratio")]
    #[validate(range(min = 0.01, max = 1.0))]
    pub eviction_ratio: f64,
}

fn default_cache_max_size() -> usize {
    100
}

fn default_cache_ttl_ms() -> u64 {
    5 * 60 * 1000 // 5 分钟
}

fn default_eviction_ratio() -> f64 {
    0.2
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_cache_max_size(),
            ttl_ms: default_cache_ttl_ms(),
            eviction_ratio: default_eviction_ratio(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// 字段索引配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IndexConfig {
    /// 可索引字段白名单
    #[serde(default = "default_indexable_fields")]
    #[validate(length(min = 1))]
    pub indexable_fields: Vec<String>,
    /// 过期窗口（毫秒），超过此时间未更新的索引会被清空
    #[serde(default = "default_staleness_ms")]
    #[validate(range(min = 1))]
    pub staleness_ms: u64,
}

fn default_indexable_fields() -> Vec<String> {
    ["name", "id", "status", "assignee", "risk_level", "priority"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_staleness_ms() -> u64 {
    30 * 60 * 1000 // 30 分钟
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            indexable_fields: default_indexable_fields(),
            staleness_ms: default_staleness_ms(),
        }
    }
}

impl IndexConfig {
    pub fn staleness(&self) -> Duration {
        Duration::from_millis(self.staleness_ms)
    }
}

/// 查询计划配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PlannerConfig {
    /// 索引候选集上限，达到或超过时不做改写
    #[serde(default = "default_max_candidate_ids")]
    #[validate(range(min = 1))]
    pub max_candidate_ids: usize,
    /// 是否启用索引辅助改写
    #[serde(default = "default_true")]
    pub index_assist_enabled: bool,
}

fn default_max_candidate_ids() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_candidate_ids: default_max_candidate_ids(),
            index_assist_enabled: true,
        }
    }
}

/// 防抖配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DebounceConfig {
    /// 静默期（毫秒）
    #[serde(default = "default_debounce_delay_ms")]
    #[validate(range(max = 60000))]
    pub delay_ms: u64,
}

fn default_debounce_delay_ms() -> u64 {
    300
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_debounce_delay_ms(),
        }
    }
}

impl DebounceConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// 性能监控配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MonitorConfig {
    /// 每个指标保留的样本数
    #[serde(default = "default_window_size")]
    #[validate(range(min = 1))]
    pub window_size: usize,
    /// 慢查询阈值（毫秒）
    #[serde(default = "default_slow_query_threshold_ms")]
    pub slow_query_threshold_ms: u64,
    /// 慢查询列表上限
    #[serde(default = "default_max_slow_queries")]
    #[validate(range(min = 1))]
    pub max_slow_queries: usize,
    /// 命中率告警阈值
    #[serde(default = "default_min_hit_rate")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_hit_rate: f64,
}

fn default_window_size() -> usize {
    100
}

fn default_slow_query_threshold_ms() -> u64 {
    1000
}

fn default_max_slow_queries() -> usize {
    50
}

fn default_min_hit_rate() -> f64 {
    0.3
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            slow_query_threshold_ms: default_slow_query_threshold_ms(),
            max_slow_queries: default_max_slow_queries(),
            min_hit_rate: default_min_hit_rate(),
        }
    }
}

/// 条件构建器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CriteriaConfig {
    #[serde(default = "default_max_sort_criteria")]
    #[validate(range(min = 1))]
    pub max_sort_criteria: usize,
    #[serde(default = "default_max_filter_criteria")]
    #[validate(range(min = 1))]
    pub max_filter_criteria: usize,
}

fn default_max_sort_criteria() -> usize {
    3
}

fn default_max_filter_criteria() -> usize {
    10
}

impl Default for CriteriaConfig {
    fn default() -> Self {
        Self {
            max_sort_criteria: default_max_sort_criteria(),
            max_filter_criteria: default_max_filter_criteria(),
        }
    }
}

/// 后台维护配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MaintenanceConfig {
    /// 清理周期（毫秒）
    #[serde(default = "default_sweep_interval_ms")]
    #[validate(range(min = 1))]
    pub sweep_interval_ms: u64,
}

fn default_sweep_interval_ms() -> u64 {
    60 * 1000 // 每分钟一次
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl MaintenanceConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoggingConfig {
    /// 默认过滤级别，可被 RUST_LOG 覆盖
    #[serde(default = "default_log_level")]
    #[validate(length(min = 1, max = 100))]
    pub level: String,
    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl SearchConfiguration {
    /// 从 TOML 文件加载配置
    ///
    /// # Errors
    /// 如果文件不存在、格式错误或验证失败，返回错误
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> EyreResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .wrap_err_with(|| format!("Failed to parse TOML config: {}", path.display()))?;
        config.ensure_valid()?;

        tracing::info!("Loaded search configuration from: {}", path.display());
        Ok(config)
    }

    /// 从 JSON 文件加载配置
    ///
    /// # Errors
    /// 如果文件不存在、格式错误或验证失败，返回错误
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> EyreResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .wrap_err_with(|| format!("Failed to parse JSON config: {}", path.display()))?;
        config.ensure_valid()?;

        tracing::info!("Loaded search configuration from: {}", path.display());
        Ok(config)
    }

    /// 分层加载：可选配置文件 + 环境变量
    ///
    /// 环境变量格式为 `SABS_SEARCH__CACHE__MAX_SIZE=200`
    pub fn load(path: Option<&Path>) -> EyreResult<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("index.indexable_fields"),
        );

        let settings = builder.build().wrap_err("Failed to build layered configuration")?;
        let config: Self = settings
            .try_deserialize()
            .wrap_err("Failed to deserialize layered configuration")?;
        config.ensure_valid()?;

        tracing::debug!(from_file = path.is_some(), "Loaded layered search configuration");
        Ok(config)
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_toml<P: AsRef<Path>>(&self, path: P) -> EyreResult<()> {
        let path = path.as_ref();
        let content = toml::to_string(self).wrap_err("Failed to serialize config to TOML")?;

        std::fs::write(path, content)
            .wrap_err_with(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved search configuration to: {}", path.display());
        Ok(())
    }

    /// 创建开发环境默认配置：缓存更小、慢查询阈值更低
    pub fn development() -> Self {
        Self {
            cache: CacheConfig {
                max_size: 50,
                ttl_ms: 60 * 1000,
                ..CacheConfig::default()
            },
            monitor: MonitorConfig {
                slow_query_threshold_ms: 500,
                ..MonitorConfig::default()
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
            ..Self::default()
        }
    }

    /// 创建生产环境默认配置
    pub fn production() -> Self {
        Self {
            cache: CacheConfig {
                max_size: 500,
                ttl_ms: 10 * 60 * 1000, // 10 分钟
                ..CacheConfig::default()
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: true,
            },
            ..Self::default()
        }
    }

    /// 验证配置
    ///
    /// # Errors
    /// 如果配置无效，返回错误
    pub fn ensure_valid(&self) -> EyreResult<()> {
        self.validate().wrap_err("Invalid search configuration")?;
        tracing::debug!("Search configuration validated successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_configuration() {
        let config = SearchConfiguration::default();
        assert_eq!(config.cache.max_size, 100);
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert_eq!(config.debounce.delay(), Duration::from_millis(300));
        assert_eq!(config.monitor.slow_query_threshold_ms, 1000);
        assert_eq!(config.monitor.max_slow_queries, 50);
        assert_eq!(config.criteria.max_sort_criteria, 3);
        assert_eq!(config.criteria.max_filter_criteria, 10);
        assert_eq!(config.index.staleness(), Duration::from_secs(1800));
        assert_eq!(config.planner.max_candidate_ids, 1000);
        assert_eq!(config.maintenance.sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_environment_presets_are_valid() {
        assert!(SearchConfiguration::development().ensure_valid().is_ok());
        assert!(SearchConfiguration::production().ensure_valid().is_ok());
    }

    #[test]
    fn test_configuration_validation() {
        let mut invalid = SearchConfiguration::default();
        invalid.cache.max_size = 0;
        assert!(invalid.ensure_valid().is_err());

        let mut invalid = SearchConfiguration::default();
        invalid.index.indexable_fields.clear();
        assert!(invalid.ensure_valid().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        temp_file
            .write_all(b"[cache]\nmax_size = 7\n")
            .expect("Failed to write to temp file");

        let config = SearchConfiguration::from_toml_file(temp_file.path())
            .expect("Failed to load from TOML file");

        assert_eq!(config.cache.max_size, 7);
        assert_eq!(config.cache.ttl_ms, 300_000);
        assert_eq!(config.debounce.delay_ms, 300);
    }

    #[test]
    fn test_load_from_json_file() {
        let config = SearchConfiguration::production();
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let json_content = serde_json::to_string(&config).expect("Failed to serialize");
        temp_file
            .write_all(json_content.as_bytes())
            .expect("Failed to write to temp file");

        let loaded = SearchConfiguration::from_json_file(temp_file.path())
            .expect("Failed to load from JSON file");
        assert_eq!(loaded.cache.max_size, 500);
        assert!(loaded.logging.json);
    }

    #[test]
    fn test_save_and_load_toml() {
        let config = SearchConfiguration::development();
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");

        config
            .save_to_toml(temp_file.path())
            .expect("Failed to save to TOML");
        let loaded = SearchConfiguration::from_toml_file(temp_file.path())
            .expect("Failed to load from TOML");

        assert_eq!(loaded.cache.max_size, config.cache.max_size);
        assert_eq!(loaded.logging.level, "debug");
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = SearchConfiguration::load(None).expect("Failed to load defaults");
        assert_eq!(config.criteria.max_sort_criteria, 3);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        temp_file
            .write_all(b"[cache]\nmax_size = 0\n")
            .expect("Failed to write to temp file");

        assert!(SearchConfiguration::from_toml_file(temp_file.path()).is_err());
    }
}
