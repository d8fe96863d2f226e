//! 日志初始化
//!
//! 使用 tracing-subscriber，`RUST_LOG` 优先于配置中的默认级别

use crate::models::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// 安装全局 tracing 订阅器
///
/// 重复调用不会失败，第二次及之后的调用直接返回 false
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let installed = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::info!(level = %config.level, json = config.json, "Tracing initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig::default();
        let _ = init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
