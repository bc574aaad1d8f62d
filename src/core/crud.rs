//! CRUD orchestration
//!
//! [`CollectionEngine`] sequences one request through the canonical pipeline:
//! authorize → build input → "before" hook → store call → "after" hook →
//! shape response. The skeleton is identical for every operation; only the
//! store call and hook stage names differ. Any error at any stage aborts the
//! remaining stages and propagates to the transport boundary.

use crate::config::CollectionConfig;
use crate::core::auth::{self, AuthUser, LogicalOperation, PermissionContext};
use crate::core::error::{CorralError, CorralResult};
use crate::core::filter::RESERVED_PREFIX;
use crate::core::hooks::{self, CollectionHooks, HookContext, HookStage};
use crate::core::query::{PaginationMeta, QueryBuilder};
use crate::core::schema::{SchemaAdapter, ValidationOutcome};
use crate::core::store::DocumentStore;
use axum::http::StatusCode;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// The uniform output of every operation.
#[derive(Debug)]
pub enum OperationResult {
    /// Normal completion: a status plus the payload to serialize as
    /// `{"data": ..., "meta"?: ...}`.
    Completed {
        status: StatusCode,
        data: Value,
        meta: Option<PaginationMeta>,
    },

    /// Sentinel: a "before" hook set `prevent_default` and took
    /// responsibility for the response; nothing further to do.
    Handled,
}

impl OperationResult {
    fn ok(data: Value) -> Self {
        OperationResult::Completed {
            status: StatusCode::OK,
            data,
            meta: None,
        }
    }

    fn created(data: Value) -> Self {
        OperationResult::Completed {
            status: StatusCode::CREATED,
            data,
            meta: None,
        }
    }

    fn list(data: Value, meta: PaginationMeta) -> Self {
        OperationResult::Completed {
            status: StatusCode::OK,
            data,
            meta: Some(meta),
        }
    }
}

/// One collection's fully wired CRUD engine.
///
/// Holds the store handle, schema adapter, per-collection configuration, and
/// optional hooks. Engines are cheap to clone and share no mutable state;
/// concurrency exists only across independent requests.
#[derive(Clone)]
pub struct CollectionEngine {
    name: String,
    store: Arc<dyn DocumentStore>,
    schema: Arc<dyn SchemaAdapter>,
    config: CollectionConfig,
    hooks: Option<Arc<dyn CollectionHooks>>,
}

impl CollectionEngine {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn DocumentStore>,
        schema: Arc<dyn SchemaAdapter>,
        config: CollectionConfig,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            schema,
            config,
            hooks: None,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn CollectionHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // -----------------------------------------------------------------------
    // Shared pipeline pieces
    // -----------------------------------------------------------------------

    async fn authorize(
        &self,
        operation: LogicalOperation,
        user: Option<&AuthUser>,
        request_data: Option<&Value>,
        record_id: Option<&str>,
    ) -> CorralResult<()> {
        let rule = self.config.permissions.get(operation.name());
        let ctx = PermissionContext {
            user,
            collection: &self.name,
            operation,
            request_data,
            record_id,
        };
        auth::evaluate(rule, &ctx).await
    }

    fn query_builder(&self) -> QueryBuilder<'_> {
        let list = &self.config.list;
        QueryBuilder::new(
            Some(self.schema.as_ref()),
            list.allowed_filter_fields.as_deref(),
            list.allowed_sort_fields.as_deref(),
            list.default_sort.as_deref(),
            list.filter_limits(),
            list.default_limit,
            list.max_limit,
        )
    }

    fn validate_body(&self, body: &Value) -> CorralResult<Value> {
        match self.schema.validate(body) {
            ValidationOutcome::Valid { data } => Ok(data),
            ValidationOutcome::Invalid(errors) => Err(CorralError::Validation(errors)),
        }
    }

    fn hook_ctx(&self, operation: LogicalOperation, user: Option<&AuthUser>) -> HookContext {
        let mut ctx = HookContext::new(&self.name, operation);
        ctx.user = user.cloned();
        ctx
    }

    async fn run_hook(&self, stage: HookStage, ctx: &mut HookContext) -> CorralResult<()> {
        hooks::run_stage(self.hooks.as_ref(), stage, ctx).await
    }

    /// Reject patch bodies that are not plain objects or that try to smuggle
    /// store-level update operators through a `$`-prefixed top-level key.
    fn check_patch_body(&self, body: &Value) -> CorralResult<()> {
        let Some(obj) = body.as_object() else {
            return Err(CorralError::bad_request(
                "INVALID_BODY",
                "patch body must be a JSON object",
            ));
        };
        for key in obj.keys() {
            if key.starts_with(RESERVED_PREFIX) {
                return Err(CorralError::bad_request_with(
                    "RESERVED_BODY_KEY",
                    format!("body key '{}' uses the reserved '$' prefix", key),
                    serde_json::json!({ "key": key }),
                ));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// List records: bounded find plus count, combined into page metadata.
    pub async fn list(
        &self,
        params: &IndexMap<String, String>,
        user: Option<&AuthUser>,
    ) -> CorralResult<OperationResult> {
        self.authorize(LogicalOperation::Read, user, None, None).await?;

        let descriptor = self.query_builder().build(params)?;
        tracing::debug!(collection = %self.name, conditions = descriptor.predicate.len(), "listing records");

        let mut ctx = self.hook_ctx(LogicalOperation::Read, user);
        ctx.query = Some(descriptor);
        self.run_hook(HookStage::BeforeFind, &mut ctx).await?;
        if ctx.prevent_default {
            return Ok(OperationResult::Handled);
        }

        // A before hook may have replaced the descriptor wholesale.
        let descriptor = ctx
            .query
            .take()
            .ok_or_else(|| CorralError::internal("hook removed the query descriptor"))?;

        // The fetch and the count are independent reads; run them together.
        let (records, total) = tokio::try_join!(
            self.store.find(&self.name, &descriptor),
            self.store.count(&self.name, &descriptor.predicate),
        )?;

        let meta = PaginationMeta::new(descriptor.page(), descriptor.limit, total);
        ctx.result = Some(Value::Array(records));
        self.run_hook(HookStage::AfterFind, &mut ctx).await?;

        let data = ctx.result.take().unwrap_or_else(|| Value::Array(vec![]));
        Ok(OperationResult::list(data, meta))
    }

    /// Fetch a single record by id.
    pub async fn get(
        &self,
        id: &str,
        params: &IndexMap<String, String>,
        user: Option<&AuthUser>,
    ) -> CorralResult<OperationResult> {
        self.authorize(LogicalOperation::Read, user, None, Some(id)).await?;

        let descriptor = self.query_builder().build(params)?;

        let mut ctx = self.hook_ctx(LogicalOperation::Read, user);
        ctx.query = Some(descriptor);
        ctx.record_id = Some(id.to_string());
        self.run_hook(HookStage::BeforeFind, &mut ctx).await?;
        if ctx.prevent_default {
            return Ok(OperationResult::Handled);
        }

        let descriptor = ctx
            .query
            .take()
            .ok_or_else(|| CorralError::internal("hook removed the query descriptor"))?;

        let record = self
            .store
            .find_by_id(&self.name, id)
            .await?
            .ok_or_else(|| CorralError::not_found(&self.name, id))?;
        let record = if descriptor.projection.is_some() {
            descriptor.project(&record)
        } else {
            record
        };

        ctx.result = Some(record);
        self.run_hook(HookStage::AfterFind, &mut ctx).await?;

        let data = ctx.result.take().unwrap_or(Value::Null);
        Ok(OperationResult::ok(data))
    }

    /// Create a record from a schema-validated body.
    pub async fn create(
        &self,
        body: Value,
        user: Option<&AuthUser>,
    ) -> CorralResult<OperationResult> {
        self.authorize(LogicalOperation::Create, user, Some(&body), None)
            .await?;

        // Validation happens before any hook runs.
        let data = self.validate_body(&body)?;

        let mut ctx = self.hook_ctx(LogicalOperation::Create, user);
        ctx.data = Some(data);
        self.run_hook(HookStage::BeforeCreate, &mut ctx).await?;
        if ctx.prevent_default {
            return Ok(OperationResult::Handled);
        }

        let data = ctx
            .data
            .take()
            .ok_or_else(|| CorralError::internal("hook removed the create payload"))?;
        let created = self.store.insert(&self.name, data).await?;
        tracing::debug!(collection = %self.name, "record created");

        ctx.result = Some(created);
        self.run_hook(HookStage::AfterCreate, &mut ctx).await?;

        let data = ctx.result.take().unwrap_or(Value::Null);
        Ok(OperationResult::created(data))
    }

    /// Replace a record wholesale; the body must pass full schema validation.
    pub async fn replace(
        &self,
        id: &str,
        body: Value,
        user: Option<&AuthUser>,
    ) -> CorralResult<OperationResult> {
        self.authorize(LogicalOperation::Update, user, Some(&body), Some(id))
            .await?;

        let data = self.validate_body(&body)?;

        let mut ctx = self.hook_ctx(LogicalOperation::Update, user);
        ctx.data = Some(data);
        ctx.record_id = Some(id.to_string());
        self.run_hook(HookStage::BeforeUpdate, &mut ctx).await?;
        if ctx.prevent_default {
            return Ok(OperationResult::Handled);
        }

        let data = ctx
            .data
            .take()
            .ok_or_else(|| CorralError::internal("hook removed the replace payload"))?;
        let updated = self
            .store
            .replace_by_id(&self.name, id, data)
            .await?
            .ok_or_else(|| CorralError::not_found(&self.name, id))?;

        ctx.result = Some(updated);
        self.run_hook(HookStage::AfterUpdate, &mut ctx).await?;

        let data = ctx.result.take().unwrap_or(Value::Null);
        Ok(OperationResult::ok(data))
    }

    /// Apply a partial update. Only the supplied fields change; the body is
    /// checked for shape and reserved keys but not schema-validated.
    pub async fn patch(
        &self,
        id: &str,
        body: Value,
        user: Option<&AuthUser>,
    ) -> CorralResult<OperationResult> {
        self.authorize(LogicalOperation::Patch, user, Some(&body), Some(id))
            .await?;

        self.check_patch_body(&body)?;

        let mut ctx = self.hook_ctx(LogicalOperation::Patch, user);
        ctx.data = Some(body);
        ctx.record_id = Some(id.to_string());
        self.run_hook(HookStage::BeforeUpdate, &mut ctx).await?;
        if ctx.prevent_default {
            return Ok(OperationResult::Handled);
        }

        let fields = ctx
            .data
            .take()
            .ok_or_else(|| CorralError::internal("hook removed the patch payload"))?;
        let updated = self
            .store
            .patch_by_id(&self.name, id, fields)
            .await?
            .ok_or_else(|| CorralError::not_found(&self.name, id))?;

        ctx.result = Some(updated);
        self.run_hook(HookStage::AfterUpdate, &mut ctx).await?;

        let data = ctx.result.take().unwrap_or(Value::Null);
        Ok(OperationResult::ok(data))
    }

    /// Delete a record, returning the removed document.
    pub async fn delete(&self, id: &str, user: Option<&AuthUser>) -> CorralResult<OperationResult> {
        self.authorize(LogicalOperation::Delete, user, None, Some(id))
            .await?;

        let mut ctx = self.hook_ctx(LogicalOperation::Delete, user);
        ctx.record_id = Some(id.to_string());
        self.run_hook(HookStage::BeforeDelete, &mut ctx).await?;
        if ctx.prevent_default {
            return Ok(OperationResult::Handled);
        }

        let removed = self
            .store
            .delete_by_id(&self.name, id)
            .await?
            .ok_or_else(|| CorralError::not_found(&self.name, id))?;
        tracing::debug!(collection = %self.name, id = %id, "record deleted");

        ctx.result = Some(removed);
        self.run_hook(HookStage::AfterDelete, &mut ctx).await?;

        let data = ctx.result.take().unwrap_or(Value::Null);
        Ok(OperationResult::ok(data))
    }
}
