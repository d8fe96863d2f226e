//! 过滤/排序条件构建器
//!
//! 维护有序的排序条件列表和过滤条件集合，每次变更都把完整快照交给调用方的回调。
//! 构建器不持有计划器或缓存的引用。

use crate::error::{AppError, Result};
use crate::models::config::CriteriaConfig;
use crate::models::criteria::{
    CriteriaSnapshot, FieldCatalog, FieldDefinition, FilterCriterion, FilterOperator,
    FilterPreset, FilterValue, LogicOperator, SortCriterion, SortPreset,
};
use crate::models::{FilterMap, SearchQuery};
use tracing::{debug, warn};
use uuid::Uuid;
use validator::Validate;

/// 条件变更回调
pub type ChangeHandler = Box<dyn Fn(&CriteriaSnapshot) + Send + Sync>;

/**
 * 条件构建器
 *
 * 条件 ID 由构建器生成，与字段 ID 无关；同一字段同时只能出现一次。
 */
pub struct CriteriaBuilder {
    catalog: FieldCatalog,
    config: CriteriaConfig,
    sort: Vec<SortCriterion>,
    filters: Vec<FilterCriterion>,
    on_change: Option<ChangeHandler>,
}

impl CriteriaBuilder {
    pub fn new(catalog: FieldCatalog, config: CriteriaConfig) -> Self {
        Self {
            catalog,
            config,
            sort: Vec::new(),
            filters: Vec::new(),
            on_change: None,
        }
    }

    /// 设置变更回调，替换之前的回调
    pub fn on_change<F>(&mut self, handler: F)
    where
        F: Fn(&CriteriaSnapshot) + Send + Sync + 'static,
    {
        self.on_change = Some(Box::new(handler));
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    // ---------------------------------------------------------------
    // 排序
    // ---------------------------------------------------------------

    /// 按字段默认方向追加排序条件
    ///
    /// 字段未知、不可排序、已存在或已达上限时不做任何操作，返回 None
    pub fn add_sort(&mut self, field_id: &str) -> Option<String> {
        let field = self.catalog.get(field_id).filter(|f| f.sortable)?;
        if self.sort.len() >= self.config.max_sort_criteria {
            debug!(field_id = field_id, "Sort capacity reached, ignoring");
            return None;
        }
        if self.sort.iter().any(|c| c.field_id == field_id) {
            return None;
        }

        let criterion = SortCriterion {
            id: format!("sort-{}", Uuid::new_v4()),
            field_id: field.id.clone(),
            direction: field.default_direction,
        };
        let id = criterion.id.clone();
        self.sort.push(criterion);
        self.emit();
        Some(id)
    }

    /// 原地翻转方向，不改变顺序
    pub fn toggle_direction(&mut self, criterion_id: &str) -> bool {
        let Some(criterion) = self.sort.iter_mut().find(|c| c.id == criterion_id) else {
            return false;
        };
        criterion.direction = criterion.direction.flipped();
        self.emit();
        true
    }

    pub fn remove_sort(&mut self, criterion_id: &str) -> bool {
        let before = self.sort.len();
        self.sort.retain(|c| c.id != criterion_id);
        if self.sort.len() == before {
            return false;
        }
        self.emit();
        true
    }

    /// 调整优先级，`to` 超出范围时移到末尾
    pub fn move_sort(&mut self, criterion_id: &str, to: usize) -> bool {
        let Some(from) = self.sort.iter().position(|c| c.id == criterion_id) else {
            return false;
        };
        let criterion = self.sort.remove(from);
        let to = to.min(self.sort.len());
        self.sort.insert(to, criterion);
        if from != to {
            self.emit();
        }
        true
    }

    pub fn clear_sort(&mut self) {
        if self.sort.is_empty() {
            return;
        }
        self.sort.clear();
        self.emit();
    }

    /**
     * 应用排序预设
     *
     * 整体替换当前排序列表并把预设的使用次数加一。
     * 目录中不存在或不可排序的字段会被跳过，超过上限的部分被截断。
     */
    pub fn apply_sort_preset(&mut self, preset: &mut SortPreset) {
        let mut next: Vec<SortCriterion> = Vec::with_capacity(preset.criteria.len());
        for spec in &preset.criteria {
            let known = self
                .catalog
                .get(&spec.field)
                .map(|f| f.sortable)
                .unwrap_or(false);
            if !known {
                warn!(preset = %preset.id, field = %spec.field, "Skipping unknown sort field in preset");
                continue;
            }
            if next.iter().any(|c| c.field_id == spec.field) {
                continue;
            }
            if next.len() >= self.config.max_sort_criteria {
                warn!(preset = %preset.id, "Sort preset exceeds capacity, truncated");
                break;
            }
            next.push(SortCriterion {
                id: format!("sort-{}", Uuid::new_v4()),
                field_id: spec.field.clone(),
                direction: spec.direction,
            });
        }

        self.sort = next;
        preset.usage_count += 1;
        debug!(preset = %preset.id, usage_count = preset.usage_count, "Sort preset applied");
        self.emit();
    }

    pub fn sort_criteria(&self) -> &[SortCriterion] {
        &self.sort
    }

    // ---------------------------------------------------------------
    // 过滤
    // ---------------------------------------------------------------

    /**
     * 添加过滤条件
     *
     * # 返回
     * * `Ok(Some(id))` - 已添加
     * * `Ok(None)` - 字段已存在或已达上限，未做任何操作
     * * `Err(AppError::Validation)` - 字段未知、不可过滤，或操作符与值不匹配
     */
    pub fn add_filter(
        &mut self,
        field_id: &str,
        operator: FilterOperator,
        value: FilterValue,
    ) -> Result<Option<String>> {
        let field = self.filterable_field(field_id)?;
        Self::check_value(field, operator, &value)?;

        if self.filters.iter().any(|c| c.field_id == field_id) {
            return Ok(None);
        }
        if self.filters.len() >= self.config.max_filter_criteria {
            debug!(field_id = field_id, "Filter capacity reached, ignoring");
            return Ok(None);
        }

        let logic = if self.filters.is_empty() {
            None
        } else {
            Some(LogicOperator::And)
        };
        let criterion = Self::new_filter(field, operator, value, logic);
        let id = criterion.id.clone();
        self.filters.push(criterion);
        self.emit();
        Ok(Some(id))
    }

    /// 更新已有过滤条件的值，返回条件是否存在
    pub fn update_filter_value(&mut self, criterion_id: &str, value: FilterValue) -> Result<bool> {
        let Some(index) = self.filters.iter().position(|c| c.id == criterion_id) else {
            return Ok(false);
        };

        let (field_id, operator) = {
            let criterion = &self.filters[index];
            (criterion.field_id.clone(), criterion.operator)
        };
        let field = self.filterable_field(&field_id)?;
        Self::check_value(field, operator, &value)?;
        let display_label = Self::label_for(field, operator, &value);

        let criterion = &mut self.filters[index];
        criterion.value = value;
        criterion.display_label = display_label;
        self.emit();
        Ok(true)
    }

    pub fn remove_filter(&mut self, criterion_id: &str) -> bool {
        let before = self.filters.len();
        self.filters.retain(|c| c.id != criterion_id);
        if self.filters.len() == before {
            return false;
        }
        if let Some(first) = self.filters.first_mut() {
            first.logic = None;
        }
        self.emit();
        true
    }

    pub fn clear_filters(&mut self) {
        if self.filters.is_empty() {
            return;
        }
        self.filters.clear();
        self.emit();
    }

    /**
     * 应用过滤预设
     *
     * 整体替换当前过滤条件并把预设的使用次数加一，无效项记录警告后跳过
     */
    pub fn apply_filter_preset(&mut self, preset: &mut FilterPreset) {
        let mut next: Vec<FilterCriterion> = Vec::with_capacity(preset.filters.len());
        for item in &preset.filters {
            let field = match self.filterable_field(&item.field_id) {
                Ok(field) => field,
                Err(e) => {
                    warn!(preset = %preset.id, error = %e, "Skipping filter preset item");
                    continue;
                }
            };
            if let Err(e) = Self::check_value(field, item.operator, &item.value) {
                warn!(preset = %preset.id, error = %e, "Skipping filter preset item");
                continue;
            }
            if next.iter().any(|c| c.field_id == item.field_id) {
                continue;
            }
            if next.len() >= self.config.max_filter_criteria {
                warn!(preset = %preset.id, "Filter preset exceeds capacity, truncated");
                break;
            }
            let logic = if next.is_empty() { None } else { Some(item.logic) };
            next.push(Self::new_filter(field, item.operator, item.value.clone(), logic));
        }

        self.filters = next;
        preset.usage_count += 1;
        debug!(preset = %preset.id, usage_count = preset.usage_count, "Filter preset applied");
        self.emit();
    }

    pub fn filter_criteria(&self) -> &[FilterCriterion] {
        &self.filters
    }

    /// 过滤条件序列化为计划器使用的过滤映射
    pub fn filters_map(&self) -> FilterMap {
        self.filters
            .iter()
            .map(|c| (c.field_id.clone(), c.to_filter_value()))
            .collect()
    }

    pub fn snapshot(&self) -> CriteriaSnapshot {
        CriteriaSnapshot {
            filters: self.filters_map(),
            sort: self.sort.iter().map(SortCriterion::to_spec).collect(),
        }
    }

    /// 用当前条件组装并校验查询
    pub fn build_query(&self, text: impl Into<String>, page: u32, limit: u32) -> Result<SearchQuery> {
        let snapshot = self.snapshot();
        let query = SearchQuery {
            text: text.into(),
            filters: snapshot.filters,
            sort: snapshot.sort,
            page,
            limit,
        };
        query.validate()?;
        Ok(query)
    }

    fn filterable_field(&self, field_id: &str) -> Result<&FieldDefinition> {
        match self.catalog.get(field_id) {
            Some(field) if field.filterable => Ok(field),
            Some(_) => Err(AppError::validation_error(format!(
                "Field '{}' is not filterable",
                field_id
            ))),
            None => Err(AppError::validation_error(format!(
                "Unknown field '{}'",
                field_id
            ))),
        }
    }

    fn check_value(
        field: &FieldDefinition,
        operator: FilterOperator,
        value: &FilterValue,
    ) -> Result<()> {
        if !field.field_type.allows(operator) {
            return Err(AppError::validation_error(format!(
                "Operator '{}' is not supported by field '{}'",
                operator.as_str(),
                field.id
            )));
        }
        if !field.field_type.accepts(operator, value) {
            return Err(AppError::validation_error(format!(
                "Value '{}' is not valid for '{}' {}",
                value.display(),
                field.id,
                operator.as_str()
            )));
        }
        Ok(())
    }

    fn new_filter(
        field: &FieldDefinition,
        operator: FilterOperator,
        value: FilterValue,
        logic: Option<LogicOperator>,
    ) -> FilterCriterion {
        FilterCriterion {
            id: format!("filter-{}", Uuid::new_v4()),
            field_id: field.id.clone(),
            operator,
            display_label: Self::label_for(field, operator, &value),
            value,
            logic,
        }
    }

    fn label_for(field: &FieldDefinition, operator: FilterOperator, value: &FilterValue) -> String {
        let op = operator.as_str().replace('_', " ");
        if operator.is_unary() {
            format!("{} {}", field.label, op)
        } else {
            format!("{} {} {}", field.label, op, value.display())
        }
    }

    fn emit(&self) {
        if let Some(handler) = &self.on_change {
            handler(&self.snapshot());
        }
    }
}
