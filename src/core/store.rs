//! Document store driver seam
//!
//! The engine only ever talks to a store through this trait, and only with
//! an already-validated [`QueryDescriptor`] or write payload. Drivers are
//! responsible for connection pooling, timeouts, and retries; the engine
//! treats every call as "completes or raises".

use crate::core::filter::FilterPredicate;
use crate::core::query::QueryDescriptor;
use async_trait::async_trait;
use serde_json::Value;

/// Storage backend for JSON documents, addressed by collection name.
///
/// `replace_by_id`, `patch_by_id`, and `delete_by_id` return `None` when no
/// record matches; the orchestrator turns that into a not-found error.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Execute a bounded read: predicate, sort, skip, limit, projection.
    async fn find(&self, collection: &str, descriptor: &QueryDescriptor)
    -> anyhow::Result<Vec<Value>>;

    /// Count records matching the predicate, ignoring pagination.
    async fn count(&self, collection: &str, predicate: &FilterPredicate) -> anyhow::Result<usize>;

    async fn find_by_id(&self, collection: &str, id: &str) -> anyhow::Result<Option<Value>>;

    /// Insert a document, assigning an id when absent; returns the stored
    /// record.
    async fn insert(&self, collection: &str, data: Value) -> anyhow::Result<Value>;

    /// Replace a document wholesale, preserving its id.
    async fn replace_by_id(
        &self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> anyhow::Result<Option<Value>>;

    /// Merge the supplied top-level fields into an existing document.
    async fn patch_by_id(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> anyhow::Result<Option<Value>>;

    /// Remove a document, returning it when it existed.
    async fn delete_by_id(&self, collection: &str, id: &str) -> anyhow::Result<Option<Value>>;
}
