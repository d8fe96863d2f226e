pub mod config;
pub mod criteria;
pub mod search;

// 重新导出核心类型
pub use config::SearchConfiguration;
pub use criteria::{
    CriteriaSnapshot, FieldCatalog, FieldDefinition, FieldType, FilterCriterion, FilterOperator,
    FilterPreset, FilterValue, LogicOperator, PresetFilter, SortCriterion, SortPreset,
};
pub use search::*;
