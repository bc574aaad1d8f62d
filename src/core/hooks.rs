//! Lifecycle hook interception
//!
//! User-supplied logic runs immediately before and after each store
//! operation. A single mutable [`HookContext`] is threaded through the
//! stages of one request; hooks mutate `data`, `query`, `result`, or `meta`
//! in place and the orchestrator observes the mutation as soon as the call
//! returns. The pipeline is strictly sequential, so no two hooks ever run
//! concurrently against the same context.
//!
//! Setting `prevent_default = true` in a "before" stage short-circuits the
//! pipeline: the store operation and the matching "after" stage are skipped,
//! and the hook is responsible for having produced any response itself.

use crate::core::auth::{AuthUser, LogicalOperation};
use crate::core::error::CorralResult;
use crate::core::query::QueryDescriptor;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// The eight interception stages. "Update" covers both full replace and
/// partial patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    BeforeFind,
    AfterFind,
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
}

impl HookStage {
    pub fn name(&self) -> &'static str {
        match self {
            HookStage::BeforeFind => "before_find",
            HookStage::AfterFind => "after_find",
            HookStage::BeforeCreate => "before_create",
            HookStage::AfterCreate => "after_create",
            HookStage::BeforeUpdate => "before_update",
            HookStage::AfterUpdate => "after_update",
            HookStage::BeforeDelete => "before_delete",
            HookStage::AfterDelete => "after_delete",
        }
    }
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The single mutable object threaded through the before/after stages of one
/// request. Created by the orchestrator, mutated in place by hook code,
/// discarded once the response is shaped.
#[derive(Debug)]
pub struct HookContext {
    pub collection: String,
    pub operation: LogicalOperation,
    pub user: Option<AuthUser>,
    /// Read descriptor; a before hook may replace it wholesale.
    pub query: Option<QueryDescriptor>,
    /// Write payload; a before hook may mutate it.
    pub data: Option<Value>,
    /// Store output; an after hook may replace it, and whatever it holds
    /// after the stage becomes the response payload.
    pub result: Option<Value>,
    pub record_id: Option<String>,
    /// Free-form scratch space shared between before and after stages.
    pub meta: IndexMap<String, Value>,
    /// Set by a before hook to skip the store operation and the after stage.
    pub prevent_default: bool,
}

impl HookContext {
    pub fn new(collection: impl Into<String>, operation: LogicalOperation) -> Self {
        Self {
            collection: collection.into(),
            operation,
            user: None,
            query: None,
            data: None,
            result: None,
            record_id: None,
            meta: IndexMap::new(),
            prevent_default: false,
        }
    }
}

/// Interception points for one collection.
///
/// Every method defaults to a no-op, so implementors override only the
/// stages they care about. Hook errors are never suppressed; they propagate
/// as the operation's failure.
#[async_trait]
pub trait CollectionHooks: Send + Sync {
    async fn before_find(&self, _ctx: &mut HookContext) -> anyhow::Result<()> {
        Ok(())
    }
    async fn after_find(&self, _ctx: &mut HookContext) -> anyhow::Result<()> {
        Ok(())
    }
    async fn before_create(&self, _ctx: &mut HookContext) -> anyhow::Result<()> {
        Ok(())
    }
    async fn after_create(&self, _ctx: &mut HookContext) -> anyhow::Result<()> {
        Ok(())
    }
    async fn before_update(&self, _ctx: &mut HookContext) -> anyhow::Result<()> {
        Ok(())
    }
    async fn after_update(&self, _ctx: &mut HookContext) -> anyhow::Result<()> {
        Ok(())
    }
    async fn before_delete(&self, _ctx: &mut HookContext) -> anyhow::Result<()> {
        Ok(())
    }
    async fn after_delete(&self, _ctx: &mut HookContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Run one stage against the context. Absence of a hook set is a true no-op;
/// errors are logged with the collection and stage attached, then propagated.
pub async fn run_stage(
    hooks: Option<&Arc<dyn CollectionHooks>>,
    stage: HookStage,
    ctx: &mut HookContext,
) -> CorralResult<()> {
    let Some(hooks) = hooks else {
        return Ok(());
    };

    let outcome = match stage {
        HookStage::BeforeFind => hooks.before_find(ctx).await,
        HookStage::AfterFind => hooks.after_find(ctx).await,
        HookStage::BeforeCreate => hooks.before_create(ctx).await,
        HookStage::AfterCreate => hooks.after_create(ctx).await,
        HookStage::BeforeUpdate => hooks.before_update(ctx).await,
        HookStage::AfterUpdate => hooks.after_update(ctx).await,
        HookStage::BeforeDelete => hooks.before_delete(ctx).await,
        HookStage::AfterDelete => hooks.after_delete(ctx).await,
    };

    if let Err(err) = outcome {
        tracing::error!(
            collection = %ctx.collection,
            stage = %stage,
            error = %err,
            "hook failed"
        );
        return Err(err.into());
    }
    Ok(())
}
