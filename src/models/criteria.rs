//! 过滤/排序条件数据结构
//!
//! 字段类型是封闭枚举，每种类型自带允许的操作符集合和值表示，
//! 通过穷尽匹配解析，不做字符串分派。

use super::search::{FilterMap, SortDirection, SortSpec};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// 字段类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Select { options: Vec<String> },
    MultiSelect { options: Vec<String> },
    Boolean,
}

/// 过滤操作符
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    Between,
    Before,
    After,
    In,
    NotIn,
    IsEmpty,
    IsNotEmpty,
}

impl FilterOperator {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::Between => "between",
            Self::Before => "before",
            Self::After => "after",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
        }
    }

    /// 不需要值的操作符
    pub const fn is_unary(self) -> bool {
        matches!(self, Self::IsEmpty | Self::IsNotEmpty)
    }
}

impl FieldType {
    /// 该字段类型允许的操作符
    pub fn allowed_operators(&self) -> &'static [FilterOperator] {
        use FilterOperator::*;
        match self {
            FieldType::Text => &[
                Contains, Equals, NotEquals, StartsWith, EndsWith, IsEmpty, IsNotEmpty,
            ],
            FieldType::Number => &[
                Equals, NotEquals, GreaterThan, LessThan, Between, IsEmpty, IsNotEmpty,
            ],
            FieldType::Date => &[Equals, Before, After, Between, IsEmpty, IsNotEmpty],
            FieldType::Select { .. } => &[Equals, NotEquals, In, NotIn],
            FieldType::MultiSelect { .. } => &[In, NotIn, IsEmpty, IsNotEmpty],
            FieldType::Boolean => &[Equals],
        }
    }

    pub fn allows(&self, operator: FilterOperator) -> bool {
        self.allowed_operators().contains(&operator)
    }

    /// 检查值的表示是否与字段类型和操作符匹配
    pub fn accepts(&self, operator: FilterOperator, value: &FilterValue) -> bool {
        use FilterOperator::*;
        if !self.allows(operator) {
            return false;
        }
        if operator.is_unary() {
            return matches!(value, FilterValue::Empty);
        }
        match (self, operator, value) {
            (FieldType::Text, _, FilterValue::Text(_)) => true,
            (FieldType::Number, Between, FilterValue::NumberRange { min, max }) => min <= max,
            (FieldType::Number, Between, _) => false,
            (FieldType::Number, _, FilterValue::Number(n)) => n.is_finite(),
            (FieldType::Date, Between, FilterValue::DateRange { start, end }) => start <= end,
            (FieldType::Date, Between, _) => false,
            (FieldType::Date, _, FilterValue::Date(_)) => true,
            (FieldType::Select { options }, Equals | NotEquals, FilterValue::Choice(c)) => {
                options.contains(c)
            }
            (
                FieldType::Select { options } | FieldType::MultiSelect { options },
                In | NotIn,
                FilterValue::Choices(choices),
            ) => !choices.is_empty() && choices.iter().all(|c| options.contains(c)),
            (FieldType::Boolean, _, FilterValue::Boolean(_)) => true,
            _ => false,
        }
    }
}

/// 类型化的过滤值
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FilterValue {
    Text(String),
    Number(f64),
    NumberRange { min: f64, max: f64 },
    Date(NaiveDate),
    DateRange { start: NaiveDate, end: NaiveDate },
    Choice(String),
    Choices(Vec<String>),
    Boolean(bool),
    Empty,
}

impl FilterValue {
    /// 转换为查询中使用的 JSON 值
    pub fn to_json(&self) -> Value {
        match self {
            FilterValue::Text(s) | FilterValue::Choice(s) => Value::String(s.clone()),
            FilterValue::Number(n) => json!(n),
            FilterValue::NumberRange { min, max } => json!({ "min": min, "max": max }),
            FilterValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            FilterValue::DateRange { start, end } => json!({
                "start": start.format("%Y-%m-%d").to_string(),
                "end": end.format("%Y-%m-%d").to_string(),
            }),
            FilterValue::Choices(values) => json!(values),
            FilterValue::Boolean(b) => Value::Bool(*b),
            FilterValue::Empty => Value::Null,
        }
    }

    /// 用于展示的简短文本
    pub fn display(&self) -> String {
        match self {
            FilterValue::Text(s) | FilterValue::Choice(s) => s.clone(),
            FilterValue::Number(n) => n.to_string(),
            FilterValue::NumberRange { min, max } => format!("{} - {}", min, max),
            FilterValue::Date(d) => d.to_string(),
            FilterValue::DateRange { start, end } => format!("{} - {}", start, end),
            FilterValue::Choices(values) => values.join(", "),
            FilterValue::Boolean(b) => b.to_string(),
            FilterValue::Empty => String::new(),
        }
    }
}

/// 条件之间的逻辑组合
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicOperator {
    #[default]
    And,
    Or,
}

/// 字段定义（UI 提供的静态字段目录）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDefinition {
    pub id: String,
    pub label: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub default_direction: SortDirection,
    #[serde(default = "default_true")]
    pub sortable: bool,
    #[serde(default = "default_true")]
    pub filterable: bool,
}

fn default_true() -> bool {
    true
}

impl FieldDefinition {
    pub fn new(id: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            field_type,
            default_direction: SortDirection::Asc,
            sortable: true,
            filterable: true,
        }
    }

    pub fn with_default_direction(mut self, direction: SortDirection) -> Self {
        self.default_direction = direction;
        self
    }
}

/// 字段目录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FieldCatalog {
    pub fields: Vec<FieldDefinition>,
}

impl FieldCatalog {
    pub fn new(fields: Vec<FieldDefinition>) -> Self {
        Self { fields }
    }

    pub fn get(&self, field_id: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.id == field_id)
    }
}

/// 过滤条件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterCriterion {
    pub id: String,
    pub field_id: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
    pub display_label: String,
    /// 与前一个条件的组合方式，第一个条件为 None
    pub logic: Option<LogicOperator>,
}

impl FilterCriterion {
    /// 输出到过滤映射中的值
    ///
    /// equals / in 直接输出值，其余操作符输出 `{operator, value}` 对象
    pub fn to_filter_value(&self) -> Value {
        match self.operator {
            FilterOperator::Equals | FilterOperator::In => self.value.to_json(),
            op if op.is_unary() => json!({ "operator": op.as_str() }),
            op => json!({ "operator": op.as_str(), "value": self.value.to_json() }),
        }
    }
}

/// 排序条件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortCriterion {
    pub id: String,
    pub field_id: String,
    pub direction: SortDirection,
}

impl SortCriterion {
    pub fn to_spec(&self) -> SortSpec {
        SortSpec::new(self.field_id.clone(), self.direction)
    }
}

/// 排序预设
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SortPreset {
    pub id: String,
    pub name: String,
    pub criteria: Vec<SortSpec>,
    #[serde(default)]
    pub usage_count: u64,
}

impl SortPreset {
    pub fn new(id: impl Into<String>, name: impl Into<String>, criteria: Vec<SortSpec>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            criteria,
            usage_count: 0,
        }
    }
}

/// 预设中的单个过滤项
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresetFilter {
    pub field_id: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
    #[serde(default)]
    pub logic: LogicOperator,
}

/// 过滤预设
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterPreset {
    pub id: String,
    pub name: String,
    pub filters: Vec<PresetFilter>,
    #[serde(default)]
    pub usage_count: u64,
}

/// 条件变更后对外发出的快照
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CriteriaSnapshot {
    pub filters: FilterMap,
    pub sort: Vec<SortSpec>,
}
