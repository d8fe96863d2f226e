//! 查询归一化
//!
//! 把搜索请求规范化为稳定的缓存键：文本小写去空白，过滤条件递归排序，
//! 再以确定性的 JSON 序列化并做 URL 安全的 base64 编码。

use crate::models::{CacheKey, SearchQuery};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Map, Value};

/// 生成查询的缓存键
///
/// 纯函数，不会失败；即使是空查询也会生成一个键
pub fn normalize(query: &SearchQuery) -> CacheKey {
    let normalized = normalized_value(query);

    let serialized = match serde_json::to_string(&normalized) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "Query serialization failed, using debug rendering as key");
            format!("{:?}", normalized)
        }
    };

    CacheKey::new(URL_SAFE_NO_PAD.encode(serialized.as_bytes()))
}

/// 归一化后的查询结构（未编码），也用于日志和慢查询记录
pub fn normalized_value(query: &SearchQuery) -> Value {
    let filters: Map<String, Value> = query
        .filters
        .iter()
        .map(|(k, v)| (k.clone(), canonicalize(v)))
        .collect();

    let sort: Vec<Value> = query
        .sort
        .iter()
        .map(|s| json!([s.field, s.direction]))
        .collect();

    json!({
        "text": query.text.trim().to_lowercase(),
        "filters": filters,
        "sort": sort,
        "page": query.page,
        "limit": query.limit,
    })
}

/// 递归规范化：对象键排序，数组内容排序
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => {
            let mut canonical: Vec<(String, Value)> = items
                .iter()
                .map(|item| {
                    let item = canonicalize(item);
                    (item.to_string(), item)
                })
                .collect();
            canonical.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Array(canonical.into_iter().map(|(_, v)| v).collect())
        }
        other => other.clone(),
    }
}
