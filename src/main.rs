//! Sabs 搜索核心 - 演示入口
//!
//! 加载配置、初始化日志，对内存数据集执行几次搜索并输出结果和性能报告。
//!
//! 用法：`sabs-search [config.toml] [query text]`

use sabs_search::models::config::SearchConfiguration;
use sabs_search::monitoring::init_tracing;
use sabs_search::{
    DataSourceError, FieldCatalog, FieldDefinition, FieldType, FilterOperator, FilterValue,
    FnDataSource, Record, SearchDataSource, SearchQuery, SearchResult, SearchService,
    SortDirection,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

fn dataset() -> Vec<Record> {
    [
        json!({"id": "c-1001", "name": "John Mensah", "status": "pending", "priority": 3, "assignee": "ama"}),
        json!({"id": "c-1002", "name": "Johnny Owusu", "status": "approved", "priority": 1, "assignee": "kofi"}),
        json!({"id": "c-1003", "name": "Ama Boateng", "status": "pending", "priority": 5, "assignee": "kofi"}),
        json!({"id": "c-1004", "name": "Kwame Asante", "status": "rejected", "priority": 2, "assignee": "ama"}),
    ]
    .into_iter()
    .map(Record::from)
    .collect()
}

fn matches(record: &Record, query: &SearchQuery) -> bool {
    let text = query.text.trim().to_lowercase();
    if !text.is_empty() {
        let name = record.get("name").and_then(Value::as_str).unwrap_or_default();
        if !name.to_lowercase().contains(&text) {
            return false;
        }
    }

    query.filters.iter().all(|(field, expected)| {
        let actual = if field == "ids" {
            record.id().map(Value::String)
        } else {
            record.get(field).cloned()
        };
        match (actual, expected) {
            (Some(actual), Value::Array(options)) => options.contains(&actual),
            (Some(actual), expected) => &actual == expected,
            (None, _) => false,
        }
    })
}

/// 在内存数据集上模拟后端
fn in_memory_source() -> Arc<dyn SearchDataSource> {
    Arc::new(FnDataSource::new(|query: SearchQuery| async move {
        let mut records: Vec<Record> = dataset()
            .into_iter()
            .filter(|record| matches(record, &query))
            .collect();
        if let Some(sort) = query.sort.first() {
            records.sort_by(|a, b| {
                let key = |r: &Record| r.get(&sort.field).and_then(Value::as_i64).unwrap_or(0);
                let ordering = key(a).cmp(&key(b));
                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }
        let total = records.len() as u64;
        Ok::<_, DataSourceError>(SearchResult::for_query(&query, records, total))
    }))
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from);
    let text = args.next().unwrap_or_else(|| "john".to_string());

    let config = SearchConfiguration::load(config_path.as_deref())?;
    init_tracing(&config.logging);
    info!("Sabs search core v{}", env!("CARGO_PKG_VERSION"));

    let service = SearchService::start(config)?;
    let source = in_memory_source();

    // 相同查询第二次命中缓存
    let query = SearchQuery::text(text.as_str());
    let first = service.search(&query, source.as_ref()).await?;
    let second = service.search(&query, source.as_ref()).await?;
    info!(total = first.total, cached = Arc::ptr_eq(&first, &second), "Text search done");

    let catalog = FieldCatalog::new(vec![
        FieldDefinition::new("name", "Name", FieldType::Text),
        FieldDefinition::new(
            "status",
            "Status",
            FieldType::MultiSelect {
                options: vec!["pending".into(), "approved".into(), "rejected".into()],
            },
        ),
        FieldDefinition::new("priority", "Priority", FieldType::Number)
            .with_default_direction(SortDirection::Desc),
    ]);
    let mut builder = service.criteria_builder(catalog);
    builder.on_change(|snapshot| {
        tracing::debug!(filters = ?snapshot.filters, sort = ?snapshot.sort, "Criteria changed");
    });
    builder.add_filter(
        "status",
        FilterOperator::In,
        FilterValue::Choices(vec!["pending".into()]),
    )?;
    builder.add_sort("priority");

    let structured = builder.build_query("", 1, 20)?;
    let scheduled = service
        .schedule("demo", structured, Arc::clone(&source))
        .await?;

    println!("{}", serde_json::to_string_pretty(&*second)?);
    println!("{}", serde_json::to_string_pretty(&*scheduled)?);
    println!("{}", serde_json::to_string_pretty(&service.monitor().report())?);
    println!("{}", serde_json::to_string_pretty(&service.cache().stats())?);

    service.shutdown().await;
    Ok(())
}
