use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use validator::Validate;

/// 过滤条件映射：字段名 -> 过滤值
///
/// 使用 BTreeMap 保证遍历顺序稳定
pub type FilterMap = BTreeMap<String, Value>;

/**
 * 排序方向
 */
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// 反转方向
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

/**
 * 单个排序键
 */
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/**
 * 完整搜索查询
 *
 * 视为不可变值：所有 `with_*` 方法都返回新的查询对象
 */
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct SearchQuery {
    pub text: String,
    #[serde(default)]
    pub filters: FilterMap,
    #[serde(default)]
    pub sort: Vec<SortSpec>,
    #[validate(range(min = 1, message = "page must be >= 1"))]
    pub page: u32,
    #[validate(range(min = 1, message = "limit must be > 0"))]
    pub limit: u32,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            text: String::new(),
            filters: FilterMap::new(),
            sort: Vec::new(),
            page: 1,
            limit: 20,
        }
    }
}

impl SearchQuery {
    /// 创建只包含自由文本的查询
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..self.clone()
        }
    }

    pub fn with_filter(&self, field: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        next.filters.insert(field.into(), value);
        next
    }

    pub fn with_sort(&self, sort: Vec<SortSpec>) -> Self {
        Self {
            sort,
            ..self.clone()
        }
    }

    pub fn with_page(&self, page: u32, limit: u32) -> Self {
        Self {
            page,
            limit,
            ..self.clone()
        }
    }

    /// 纯自由文本搜索：有文本且没有结构化过滤条件
    pub fn is_pure_text(&self) -> bool {
        !self.text.trim().is_empty() && self.filters.is_empty()
    }
}

/**
 * 单条记录
 *
 * 对数据源返回的 JSON 对象的透明包装
 */
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    /// 记录 ID（`id` 字段的字符串形式）
    pub fn id(&self) -> Option<String> {
        self.0.get("id").and_then(stringify_value)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Record(map),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Record(map)
            }
        }
    }
}

/// 把标量值转换为字符串，null 返回 None
pub fn stringify_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/**
 * 搜索结果
 */
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub records: Vec<Record>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    #[serde(default)]
    pub filters: FilterMap,
    /// 结果生成时间（epoch 毫秒）
    pub timestamp: i64,
    pub execution_time_ms: u64,
}

impl SearchResult {
    /// 以查询的分页和过滤信息构造结果
    pub fn for_query(query: &SearchQuery, records: Vec<Record>, total: u64) -> Self {
        Self {
            records,
            total,
            page: query.page,
            limit: query.limit,
            filters: query.filters.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            execution_time_ms: 0,
        }
    }
}

/**
 * 归一化后的缓存键
 *
 * 不透明字符串，只包含 URL 安全字符
 */
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
