//! Property-based tests for the result cache
//!
//! Validates:
//! - Cache correctness: inserted keys are returned unchanged, unknown keys miss
//! - Capacity bound: size never exceeds the configured maximum
//! - Eviction fairness: a frequently accessed entry outlives untouched entries

#[cfg(test)]
mod tests {
    use crate::models::config::CacheConfig;
    use crate::models::{CacheKey, Record, SearchQuery, SearchResult};
    use crate::services::query_normalizer::normalize;
    use crate::utils::cache_manager::ResultCache;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    fn result_strategy() -> impl Strategy<Value = SearchResult> {
        prop::collection::vec(("[a-z0-9]{1,8}", "[A-Za-z ]{0,20}"), 0..10).prop_map(|rows| {
            let records = rows
                .into_iter()
                .map(|(id, name)| Record::from(json!({"id": id, "name": name})))
                .collect::<Vec<_>>();
            let total = records.len() as u64;
            SearchResult::for_query(&SearchQuery::default(), records, total)
        })
    }

    fn create_test_cache(max_size: usize) -> ResultCache {
        ResultCache::new(&CacheConfig {
            max_size,
            ..CacheConfig::default()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn test_cache_consistency_property(
            text in "[a-zA-Z0-9 ]{0,20}",
            result in result_strategy()
        ) {
            let cache = create_test_cache(100);
            let key = normalize(&SearchQuery::text(text));

            cache.put(key.clone(), result.clone());
            let cached = cache.get(&key);

            prop_assert!(cached.is_some(), "Cache should contain the inserted entry");
            let cached = cached.unwrap();
            prop_assert_eq!(cached.as_ref(), &result);
        }

        #[test]
        fn test_unknown_key_misses(keys in prop::collection::hash_set("[a-z]{1,10}", 1..20)) {
            let cache = create_test_cache(100);
            let mut keys: Vec<String> = keys.into_iter().collect();
            let probe = keys.pop().unwrap();

            for k in keys {
                cache.put(CacheKey::new(k), SearchResult::for_query(&SearchQuery::default(), vec![], 0));
            }

            prop_assert!(cache.get(&CacheKey::new(probe)).is_none());
        }

        #[test]
        fn test_capacity_bound_property(
            max_size in 1usize..40,
            inserts in 1usize..200
        ) {
            let cache = create_test_cache(max_size);

            for i in 0..inserts {
                cache.put(
                    CacheKey::new(format!("query_{}", i)),
                    SearchResult::for_query(&SearchQuery::default(), vec![], i as u64),
                );
                prop_assert!(cache.len() <= max_size);
            }
        }

        #[test]
        fn test_hot_entry_survives_eviction(
            max_size in 5usize..30,
            extra in 1usize..100
        ) {
            let cache = create_test_cache(max_size);
            let hot = CacheKey::new("hot");
            let hot_result = Arc::new(SearchResult::for_query(&SearchQuery::text("hot"), vec![], 1));
            cache.put(hot.clone(), hot_result.as_ref().clone());

            for i in 0..(max_size + extra) {
                prop_assert!(cache.get(&hot).is_some(), "hot entry evicted at insert {}", i);
                cache.put(
                    CacheKey::new(format!("cold_{}", i)),
                    SearchResult::for_query(&SearchQuery::default(), vec![], i as u64),
                );
            }

            prop_assert!(cache.contains(&hot));
            prop_assert!(!cache.contains(&CacheKey::new("cold_0")));
        }
    }
}
