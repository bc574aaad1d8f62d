//! In-memory implementation of DocumentStore for testing and development
//!
//! Useful as the development backend and as the reference semantics for
//! predicate evaluation. Uses RwLock for thread-safe access, with documents
//! kept in insertion order per collection.

use crate::core::filter::{FilterOp, FilterPredicate, FilterValue};
use crate::core::query::{QueryDescriptor, SortOrder};
use crate::core::store::DocumentStore;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

type Collections = HashMap<String, IndexMap<String, Value>>;

/// In-memory document store
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a collection with documents (ids assigned when absent).
    /// Convenience for tests and fixtures.
    pub async fn seed(&self, collection: &str, docs: Vec<Value>) -> Result<()> {
        for doc in docs {
            self.insert(collection, doc).await?;
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Collections>> {
        self.collections
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Collections>> {
        self.collections
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))
    }
}

// ---------------------------------------------------------------------------
// Predicate evaluation
// ---------------------------------------------------------------------------

fn doc_matches(doc: &Value, predicate: &FilterPredicate) -> bool {
    predicate.iter().all(|(field, ops)| {
        let field_value = doc.get(field);
        ops.iter().all(|(op, value)| op_matches(field_value, *op, value))
    })
}

fn op_matches(field_value: Option<&Value>, op: FilterOp, filter_value: &FilterValue) -> bool {
    match op {
        FilterOp::Eq => field_value.is_some_and(|v| values_equal(v, filter_value)),
        FilterOp::Ne => !field_value.is_some_and(|v| values_equal(v, filter_value)),
        FilterOp::Gt => ordering(field_value, filter_value) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(
            ordering(field_value, filter_value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::Lt => ordering(field_value, filter_value) == Some(Ordering::Less),
        FilterOp::Lte => matches!(
            ordering(field_value, filter_value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOp::In => match filter_value {
            FilterValue::List(items) => {
                field_value.is_some_and(|v| items.iter().any(|item| values_equal(v, item)))
            }
            single => field_value.is_some_and(|v| values_equal(v, single)),
        },
        FilterOp::Nin => !op_matches(field_value, FilterOp::In, filter_value),
        FilterOp::Like => match filter_value {
            FilterValue::Pattern(source) => field_value
                .and_then(Value::as_str)
                .is_some_and(|s| pattern_matches(source, s)),
            _ => false,
        },
        FilterOp::Exists => {
            let present = field_value.is_some_and(|v| !v.is_null());
            match filter_value {
                FilterValue::Boolean(wanted) => present == *wanted,
                _ => false,
            }
        }
    }
}

fn pattern_matches(source: &str, candidate: &str) -> bool {
    regex::RegexBuilder::new(source)
        .case_insensitive(true)
        .build()
        .map(|re| re.is_match(candidate))
        .unwrap_or(false)
}

fn values_equal(doc_value: &Value, filter_value: &FilterValue) -> bool {
    match filter_value {
        FilterValue::String(s) => doc_value.as_str() == Some(s.as_str()),
        FilterValue::Integer(i) => doc_value.as_f64() == Some(*i as f64),
        FilterValue::Float(f) => doc_value.as_f64() == Some(*f),
        FilterValue::Boolean(b) => doc_value.as_bool() == Some(*b),
        FilterValue::Date(d) => parse_doc_date(doc_value).is_some_and(|dv| dv == *d),
        FilterValue::List(items) => items.iter().any(|item| values_equal(doc_value, item)),
        FilterValue::Pattern(_) => false,
    }
}

fn ordering(field_value: Option<&Value>, filter_value: &FilterValue) -> Option<Ordering> {
    let doc_value = field_value?;
    match filter_value {
        FilterValue::Integer(i) => doc_value.as_f64()?.partial_cmp(&(*i as f64)),
        FilterValue::Float(f) => doc_value.as_f64()?.partial_cmp(f),
        FilterValue::String(s) => Some(doc_value.as_str()?.cmp(s.as_str())),
        FilterValue::Date(d) => Some(parse_doc_date(doc_value)?.cmp(d)),
        _ => None,
    }
}

fn parse_doc_date(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

// ---------------------------------------------------------------------------
// Sorting and projection
// ---------------------------------------------------------------------------

fn compare_docs(a: &Value, b: &Value, sort: &[(String, SortOrder)]) -> Ordering {
    for (field, order) in sort {
        let cmp = compare_values(a.get(field), b.get(field));
        let cmp = match order {
            SortOrder::Asc => cmp,
            SortOrder::Desc => cmp.reverse(),
        };
        if cmp != Ordering::Equal {
            return cmp;
        }
    }
    Ordering::Equal
}

/// Total order over JSON values: nulls first, then numbers, booleans,
/// strings, everything else last.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::String(_)) => 3,
            _ => 4,
        }
    }

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

// ---------------------------------------------------------------------------
// DocumentStore impl
// ---------------------------------------------------------------------------

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        descriptor: &QueryDescriptor,
    ) -> Result<Vec<Value>> {
        let collections = self.read()?;
        let mut docs: Vec<Value> = collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| doc_matches(doc, &descriptor.predicate))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if !descriptor.sort.is_empty() {
            docs.sort_by(|a, b| compare_docs(a, b, &descriptor.sort));
        }

        let mut page: Vec<Value> = docs
            .into_iter()
            .skip(descriptor.skip)
            .take(descriptor.limit)
            .collect();

        if descriptor.projection.is_some() {
            page = page.iter().map(|doc| descriptor.project(doc)).collect();
        }

        Ok(page)
    }

    async fn count(&self, collection: &str, predicate: &FilterPredicate) -> Result<usize> {
        let collections = self.read()?;
        Ok(collections
            .get(collection)
            .map(|docs| docs.values().filter(|doc| doc_matches(doc, predicate)).count())
            .unwrap_or(0))
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let collections = self.read()?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id).cloned()))
    }

    async fn insert(&self, collection: &str, mut data: Value) -> Result<Value> {
        let obj = data
            .as_object_mut()
            .ok_or_else(|| anyhow!("document must be a JSON object"))?;

        let id = match obj.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                obj.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };

        let mut collections = self.write()?;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, data.clone());
        Ok(data)
    }

    async fn replace_by_id(
        &self,
        collection: &str,
        id: &str,
        mut data: Value,
    ) -> Result<Option<Value>> {
        let mut collections = self.write()?;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(None);
        };
        if !docs.contains_key(id) {
            return Ok(None);
        }
        if let Some(obj) = data.as_object_mut() {
            obj.insert("id".to_string(), Value::String(id.to_string()));
        }
        docs.insert(id.to_string(), data.clone());
        Ok(Some(data))
    }

    async fn patch_by_id(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<Option<Value>> {
        let mut collections = self.write()?;
        let Some(doc) = collections.get_mut(collection).and_then(|docs| docs.get_mut(id)) else {
            return Ok(None);
        };
        let (Some(target), Some(patch)) = (doc.as_object_mut(), fields.as_object()) else {
            return Err(anyhow!("patch requires JSON objects"));
        };
        for (key, value) in patch {
            if key == "id" {
                continue;
            }
            target.insert(key.clone(), value.clone());
        }
        Ok(Some(doc.clone()))
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let mut collections = self.write()?;
        Ok(collections
            .get_mut(collection)
            .and_then(|docs| docs.shift_remove(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filter::{FilterLimits, FilterParser};
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn predicate(pairs: &[(&str, &str)]) -> FilterPredicate {
        FilterParser::new(None, None, FilterLimits::default())
            .parse(&params(pairs))
            .unwrap()
    }

    fn descriptor(predicate: FilterPredicate) -> QueryDescriptor {
        QueryDescriptor {
            predicate,
            sort: vec![],
            skip: 0,
            limit: 100,
            projection: None,
        }
    }

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .seed(
                "users",
                vec![
                    json!({"id": "1", "name": "Ada", "age": 36, "role": "admin"}),
                    json!({"id": "2", "name": "Brian", "age": 17, "role": "user"}),
                    json!({"id": "3", "name": "Grace", "age": 45}),
                ],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_equality_and_range_operators() {
        let store = seeded_store().await;

        let found = store
            .find("users", &descriptor(predicate(&[("name", "Ada")])))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["id"], "1");

        let found = store
            .find("users", &descriptor(predicate(&[("age__gte", "18"), ("age__lt", "40")])))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["name"], "Ada");
    }

    #[tokio::test]
    async fn test_in_and_nin() {
        let store = seeded_store().await;

        let found = store
            .find("users", &descriptor(predicate(&[("role__in", "admin,editor")])))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        let found = store
            .find("users", &descriptor(predicate(&[("name__nin", "Ada,Brian")])))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["name"], "Grace");
    }

    #[tokio::test]
    async fn test_like_is_case_insensitive_partial_match() {
        let store = seeded_store().await;
        let found = store
            .find("users", &descriptor(predicate(&[("name__like", "RA")])))
            .await
            .unwrap();
        let names: Vec<&str> = found.iter().map(|d| d["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Grace"]);
    }

    #[tokio::test]
    async fn test_like_metacharacters_are_literal() {
        let store = MemoryStore::new();
        store
            .seed("notes", vec![json!({"id": "1", "text": "a.c"}), json!({"id": "2", "text": "abc"})])
            .await
            .unwrap();
        let found = store
            .find("notes", &descriptor(predicate(&[("text__like", "a.c")])))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["text"], "a.c");
    }

    #[tokio::test]
    async fn test_exists_operator() {
        let store = seeded_store().await;

        let found = store
            .find("users", &descriptor(predicate(&[("role__exists", "true")])))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        let found = store
            .find("users", &descriptor(predicate(&[("role__exists", "false")])))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["name"], "Grace");
    }

    #[tokio::test]
    async fn test_sort_skip_limit() {
        let store = seeded_store().await;
        let q = QueryDescriptor {
            predicate: FilterPredicate::new(),
            sort: vec![("age".to_string(), SortOrder::Desc)],
            skip: 1,
            limit: 1,
            projection: None,
        };
        let found = store.find("users", &q).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["name"], "Ada");
    }

    #[tokio::test]
    async fn test_projection_keeps_id() {
        let store = seeded_store().await;
        let q = QueryDescriptor {
            predicate: predicate(&[("name", "Ada")]),
            sort: vec![],
            skip: 0,
            limit: 10,
            projection: Some(vec!["age".to_string()]),
        };
        let found = store.find("users", &q).await.unwrap();
        let doc = found[0].as_object().unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc["id"], "1");
        assert_eq!(doc["age"], 36);
    }

    #[tokio::test]
    async fn test_count_ignores_pagination() {
        let store = seeded_store().await;
        let count = store
            .count("users", &predicate(&[("age__gte", "18")]))
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_insert_assigns_id() {
        let store = MemoryStore::new();
        let created = store
            .insert("users", json!({"name": "New"}))
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert!(store.find_by_id("users", id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_replace_preserves_id_and_drops_old_fields() {
        let store = seeded_store().await;
        let updated = store
            .replace_by_id("users", "1", json!({"name": "Ada L."}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["id"], "1");
        assert_eq!(updated["name"], "Ada L.");
        assert!(updated.get("age").is_none());
    }

    #[tokio::test]
    async fn test_patch_merges_supplied_fields_only() {
        let store = seeded_store().await;
        let updated = store
            .patch_by_id("users", "1", json!({"age": 37}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["age"], 37);
        assert_eq!(updated["name"], "Ada");
    }

    #[tokio::test]
    async fn test_missing_record_returns_none() {
        let store = seeded_store().await;
        assert!(store.replace_by_id("users", "99", json!({})).await.unwrap().is_none());
        assert!(store.patch_by_id("users", "99", json!({})).await.unwrap().is_none());
        assert!(store.delete_by_id("users", "99").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_returns_removed_doc() {
        let store = seeded_store().await;
        let removed = store.delete_by_id("users", "2").await.unwrap().unwrap();
        assert_eq!(removed["name"], "Brian");
        assert!(store.find_by_id("users", "2").await.unwrap().is_none());
    }
}
