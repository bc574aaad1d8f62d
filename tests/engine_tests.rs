//! End-to-end engine tests: query string in, shaped result out.
//!
//! These drive [`CollectionEngine`] directly against a seeded in-memory
//! store, without the HTTP layer. Wire-level behavior is covered in
//! `router_tests.rs`.

use corral::prelude::*;
use indexmap::IndexMap;
use serde_json::json;
use std::sync::Arc;

fn user_schema() -> StaticSchema {
    StaticSchema::new()
        .field("name", FieldDef::required(FieldType::String))
        .field("age", FieldDef::optional(FieldType::Number))
        .field("active", FieldDef::optional(FieldType::Boolean))
}

async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .seed(
            "users",
            vec![
                json!({"id": "1", "name": "Ada", "age": 17, "active": true}),
                json!({"id": "2", "name": "Brian", "age": 18, "active": false}),
                json!({"id": "3", "name": "Carol", "age": 25, "active": true}),
                json!({"id": "4", "name": "Dave", "age": 29, "active": false}),
                json!({"id": "5", "name": "Erin", "age": 40, "active": true}),
            ],
        )
        .await
        .unwrap();
    store
}

async fn users_engine(config: CollectionConfig) -> CollectionEngine {
    let store = seeded_store().await;
    CollectionEngine::new("users", Arc::new(store), Arc::new(user_schema()), config)
}

fn params(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn completed(result: OperationResult) -> (Value, Option<PaginationMeta>) {
    match result {
        OperationResult::Completed { data, meta, .. } => (data, meta),
        OperationResult::Handled => panic!("unexpected short-circuit"),
    }
}

fn ages(data: &Value) -> Vec<i64> {
    data.as_array()
        .unwrap()
        .iter()
        .map(|doc| doc["age"].as_i64().unwrap())
        .collect()
}

// ==================================================================
// Filtering, sorting, pagination
// ==================================================================

#[tokio::test]
async fn test_filtered_sorted_first_page() {
    let engine = users_engine(CollectionConfig::default()).await;
    let result = engine
        .list(
            &params(&[
                ("age__gte", "18"),
                ("age__lte", "29"),
                ("sort", "-age"),
                ("page", "1"),
                ("limit", "2"),
            ]),
            None,
        )
        .await
        .unwrap();

    let (data, meta) = completed(result);
    assert_eq!(ages(&data), vec![29, 25]);

    // Three users match the age range; the page shows two of them.
    let meta = meta.unwrap();
    assert_eq!(meta.page, 1);
    assert_eq!(meta.limit, 2);
    assert_eq!(meta.total, 3);
    assert_eq!(meta.total_pages, 2);
}

#[tokio::test]
async fn test_total_counts_all_matches_across_pages() {
    let engine = users_engine(CollectionConfig::default()).await;

    let (data, meta) = completed(
        engine
            .list(&params(&[("sort", "age"), ("limit", "2")]), None)
            .await
            .unwrap(),
    );
    let meta = meta.unwrap();
    assert_eq!(data.as_array().unwrap().len(), 2);
    assert_eq!(meta.total, 5);
    assert_eq!(meta.total_pages, 3);

    // The last page really is reachable and holds the remainder.
    let (data, meta) = completed(
        engine
            .list(&params(&[("sort", "age"), ("limit", "2"), ("page", "3")]), None)
            .await
            .unwrap(),
    );
    let meta = meta.unwrap();
    assert_eq!(ages(&data), vec![40]);
    assert_eq!(meta.page, 3);
    assert_eq!(meta.total, 5);
    assert_eq!(meta.total_pages, 3);
}

#[tokio::test]
async fn test_operator_merge_bounds_both_sides() {
    let engine = users_engine(CollectionConfig::default()).await;
    let result = engine
        .list(&params(&[("age__gt", "18"), ("age__lt", "30"), ("sort", "age")]), None)
        .await
        .unwrap();
    let (data, _) = completed(result);
    assert_eq!(ages(&data), vec![25, 29]);
}

#[tokio::test]
async fn test_pagination_clamps_oversized_limit() {
    let engine = users_engine(CollectionConfig::default()).await;
    let result = engine
        .list(&params(&[("limit", "1000")]), None)
        .await
        .unwrap();
    let (_, meta) = completed(result);
    // Default max_limit is 100; no error, just a clamp.
    assert_eq!(meta.unwrap().limit, 100);
}

#[tokio::test]
async fn test_repeated_read_is_identical() {
    let engine = users_engine(CollectionConfig::default()).await;
    let query = params(&[("age__gte", "18"), ("sort", "-age"), ("limit", "3")]);

    let (data_a, meta_a) = completed(engine.list(&query, None).await.unwrap());
    let (data_b, meta_b) = completed(engine.list(&query, None).await.unwrap());
    assert_eq!(data_a, data_b);
    assert_eq!(meta_a, meta_b);
}

#[tokio::test]
async fn test_boolean_coercion_through_schema() {
    let engine = users_engine(CollectionConfig::default()).await;
    let (data, _) = completed(
        engine
            .list(&params(&[("active", "true"), ("sort", "age")]), None)
            .await
            .unwrap(),
    );
    assert_eq!(ages(&data), vec![17, 25, 40]);
}

#[tokio::test]
async fn test_projection_limits_returned_fields() {
    let engine = users_engine(CollectionConfig::default()).await;
    let (data, _) = completed(
        engine
            .list(&params(&[("fields", "name"), ("limit", "1")]), None)
            .await
            .unwrap(),
    );
    let doc = &data.as_array().unwrap()[0];
    assert!(doc.get("name").is_some());
    assert!(doc.get("id").is_some());
    assert!(doc.get("age").is_none());
}

#[tokio::test]
async fn test_get_applies_projection() {
    let engine = users_engine(CollectionConfig::default()).await;
    let (data, _) = completed(
        engine
            .get("1", &params(&[("fields", "name")]), None)
            .await
            .unwrap(),
    );
    assert_eq!(data.get("id"), Some(&json!("1")));
    assert_eq!(data.get("name"), Some(&json!("Ada")));
    assert!(data.get("age").is_none());
    assert!(data.get("active").is_none());
}

// ==================================================================
// Rejections
// ==================================================================

#[tokio::test]
async fn test_reserved_prefix_rejected_everywhere() {
    let engine = users_engine(CollectionConfig::default()).await;

    for query in [
        params(&[("$where", "1")]),
        params(&[("sort", "$natural")]),
        params(&[("fields", "$secret")]),
    ] {
        let err = engine.list(&query, None).await.unwrap_err();
        assert_eq!(err.error_code(), "RESERVED_FIELD_PREFIX", "query: {:?}", query);
    }
}

#[tokio::test]
async fn test_whitelist_overrides_schema() {
    let config = CollectionConfig::new().list_options(ListOptions {
        allowed_filter_fields: Some(vec!["age".to_string()]),
        ..ListOptions::default()
    });
    let engine = users_engine(config).await;

    // "name" exists in the schema but is not whitelisted.
    let err = engine
        .list(&params(&[("name", "Ada")]), None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "UNKNOWN_FILTER_FIELD");

    engine.list(&params(&[("age__gte", "18")]), None).await.unwrap();
}

#[tokio::test]
async fn test_unknown_operator_rejected() {
    let engine = users_engine(CollectionConfig::default()).await;
    let err = engine
        .list(&params(&[("age__regex", ".*")]), None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "UNSUPPORTED_OPERATOR");
}

// ==================================================================
// Hook pipeline
// ==================================================================

struct TimestampHook;

#[async_trait]
impl CollectionHooks for TimestampHook {
    async fn before_create(&self, ctx: &mut HookContext) -> Result<()> {
        if let Some(Value::Object(obj)) = ctx.data.as_mut() {
            obj.insert("created_at".to_string(), json!("2026-01-01T00:00:00Z"));
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_before_hook_stamp_survives_insert() {
    let store = seeded_store().await;
    let engine = CollectionEngine::new(
        "users",
        Arc::new(store.clone()),
        Arc::new(
            user_schema().field("created_at", FieldDef::optional(FieldType::Date)),
        ),
        CollectionConfig::default(),
    )
    .with_hooks(Arc::new(TimestampHook));

    let result = engine
        .create(json!({"name": "Frank", "age": 33}), None)
        .await
        .unwrap();
    let (data, _) = completed(result);
    assert_eq!(data["created_at"], "2026-01-01T00:00:00Z");

    let id = data["id"].as_str().unwrap();
    let stored = store.find_by_id("users", id).await.unwrap().unwrap();
    assert_eq!(stored["created_at"], "2026-01-01T00:00:00Z");
}

// ==================================================================
// Permission predicates
// ==================================================================

#[tokio::test]
async fn test_custom_predicate_sees_operation_context() {
    let rule = PermissionRule::predicate(|ctx: &PermissionContext<'_>| {
        ctx.operation == LogicalOperation::Read && ctx.collection == "users"
    });
    let config = CollectionConfig::new()
        .permission("read", rule.clone())
        .permission("delete", rule);
    let engine = users_engine(config).await;

    let user = AuthUser::new("u1", vec![]);
    engine.list(&params(&[]), Some(&user)).await.unwrap();

    // Same predicate denies delete, because the operation differs.
    let err = engine.delete("1", Some(&user)).await.unwrap_err();
    assert!(matches!(err, CorralError::Forbidden { .. }));
}
