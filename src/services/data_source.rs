//! 权威数据源抽象
//!
//! 数据源由调用方提供（例如后端搜索接口的客户端），搜索核心只调用它并对结果做出反应。

use crate::error::DataSourceError;
use crate::models::{SearchQuery, SearchResult};
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;

/// 权威数据源
///
/// 超时和重试策略由实现方负责
#[async_trait]
pub trait SearchDataSource: Send + Sync {
    async fn fetch(&self, query: SearchQuery) -> Result<SearchResult, DataSourceError>;
}

/// 把异步闭包适配为数据源
///
/// ```ignore
/// let source = FnDataSource::new(|query| async move { backend.search(query).await });
/// ```
pub struct FnDataSource<F, Fut> {
    fetch_fn: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnDataSource<F, Fut>
where
    F: Fn(SearchQuery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<SearchResult, DataSourceError>> + Send + 'static,
{
    pub fn new(fetch_fn: F) -> Self {
        Self {
            fetch_fn,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> SearchDataSource for FnDataSource<F, Fut>
where
    F: Fn(SearchQuery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<SearchResult, DataSourceError>> + Send + 'static,
{
    async fn fetch(&self, query: SearchQuery) -> Result<SearchResult, DataSourceError> {
        (self.fetch_fn)(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_data_source_forwards_query() {
        let source = FnDataSource::new(|query: SearchQuery| async move {
            Ok(SearchResult::for_query(&query, vec![], query.limit as u64))
        });

        let result = source.fetch(SearchQuery::default().with_page(2, 15)).await.unwrap();
        assert_eq!(result.page, 2);
        assert_eq!(result.total, 15);
    }

    #[tokio::test]
    async fn test_fn_data_source_forwards_error() {
        let source = FnDataSource::new(|_query: SearchQuery| async move {
            Err::<SearchResult, DataSourceError>("backend unavailable".into())
        });

        let err = source.fetch(SearchQuery::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "backend unavailable");
    }
}
