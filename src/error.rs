use miette::Diagnostic;
use thiserror::Error;

/**
 * 数据源返回的原始错误
 *
 * 由调用方提供的数据源产生，搜索核心只透传，不做任何改写
 */
pub type DataSourceError = Box<dyn std::error::Error + Send + Sync>;

/**
 * 应用错误类型 - 使用 miette 提供用户友好的错误诊断
 */
#[derive(Error, Debug, Diagnostic)]
pub enum AppError {
    #[error("Data source error: {0}")]
    #[diagnostic(
        code(search::data_source_error),
        help("The authoritative data source rejected the query; retry policy belongs to the caller")
    )]
    DataSource(#[source] DataSourceError),

    #[error("Validation error: {0}")]
    #[diagnostic(
        code(search::validation_error),
        help("Check that your input meets the required format and constraints")
    )]
    Validation(String),

    #[error("Search superseded: {search_id}")]
    #[diagnostic(
        code(search::superseded),
        help("A newer request for the same search id replaced this one before it ran")
    )]
    Superseded { search_id: String },

    #[error("Configuration error: {0}")]
    #[diagnostic(code(search::config_error))]
    Config(String),
}

impl AppError {
    /**
     * 包装数据源错误
     */
    pub fn data_source(error: DataSourceError) -> Self {
        AppError::DataSource(error)
    }

    /**
     * 创建验证错误
     */
    pub fn validation_error(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    /**
     * 创建配置错误
     */
    pub fn config_error(message: impl Into<String>) -> Self {
        AppError::Config(message.into())
    }

    /**
     * 创建被取代错误
     */
    pub fn superseded(search_id: impl Into<String>) -> Self {
        AppError::Superseded {
            search_id: search_id.into(),
        }
    }

    /// 是否为被新请求取代的错误
    pub fn is_superseded(&self) -> bool {
        matches!(self, AppError::Superseded { .. })
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/**
 * 统一结果类型
 */
pub type Result<T> = std::result::Result<T, AppError>;

/**
 * 内部结果类型 - 配置加载等使用 eyre 进行错误传播
 */
pub type EyreResult<T> = eyre::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = AppError::validation_error("Invalid input");
        assert!(matches!(error, AppError::Validation(_)));

        let error = AppError::superseded("box-1");
        assert!(error.is_superseded());
    }

    #[test]
    fn test_data_source_error_keeps_source() {
        let io_error = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "backend down");
        let app_error = AppError::data_source(Box::new(io_error));

        let source = std::error::Error::source(&app_error).expect("source should be kept");
        let io = source
            .downcast_ref::<std::io::Error>()
            .expect("source should be the original io error");
        assert_eq!(io.kind(), std::io::ErrorKind::ConnectionRefused);
    }

    #[test]
    fn test_error_display() {
        let error = AppError::superseded("box-1");
        let display = format!("{}", error);
        assert!(display.contains("superseded"));
        assert!(display.contains("box-1"));
    }
}
