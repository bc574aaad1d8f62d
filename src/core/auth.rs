//! Permission evaluation
//!
//! Each collection configures zero or more permission rules, keyed by logical
//! operation name. A rule is one of three shapes:
//! - `Public` — allow unconditionally, authenticated or not
//! - `Roles(list)` — allow if the user carries at least one of the roles
//! - `Predicate(f)` — allow iff a custom (possibly async) predicate says so
//!
//! No rule configured means allow. The evaluator distinguishes two failures:
//! `Unauthorized` (rule present, no user) and `Forbidden` (user present but
//! denied). A custom predicate is never invoked without a user.

use crate::core::error::{CorralError, CorralResult};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Authenticated subject attached to a request by the transport binding.
#[derive(Debug, Clone, Default)]
pub struct AuthUser {
    pub id: String,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn new(id: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            id: id.into(),
            roles,
        }
    }
}

/// Logical operation names permission rules are keyed by.
///
/// List and get both evaluate under `Read`; replace evaluates under `Update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOperation {
    Read,
    Create,
    Update,
    Patch,
    Delete,
}

impl LogicalOperation {
    pub fn name(&self) -> &'static str {
        match self {
            LogicalOperation::Read => "read",
            LogicalOperation::Create => "create",
            LogicalOperation::Update => "update",
            LogicalOperation::Patch => "patch",
            LogicalOperation::Delete => "delete",
        }
    }
}

impl fmt::Display for LogicalOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read-only context handed to custom permission predicates.
#[derive(Debug, Clone, Copy)]
pub struct PermissionContext<'a> {
    pub user: Option<&'a AuthUser>,
    pub collection: &'a str,
    pub operation: LogicalOperation,
    pub request_data: Option<&'a Value>,
    pub record_id: Option<&'a str>,
}

/// Custom authorization logic; may be asynchronous.
#[async_trait]
pub trait PermissionPredicate: Send + Sync {
    async fn allow(&self, ctx: &PermissionContext<'_>) -> bool;
}

/// Adapter so plain closures can serve as predicates.
pub struct FnPredicate<F>(pub F);

#[async_trait]
impl<F> PermissionPredicate for FnPredicate<F>
where
    F: Fn(&PermissionContext<'_>) -> bool + Send + Sync,
{
    async fn allow(&self, ctx: &PermissionContext<'_>) -> bool {
        (self.0)(ctx)
    }
}

/// Per-operation authorization rule for a collection.
#[derive(Clone)]
pub enum PermissionRule {
    /// Allow unconditionally, regardless of whether a user is present.
    Public,
    /// User must carry at least one of these roles.
    Roles(Vec<String>),
    /// Custom predicate; only invoked for authenticated users.
    Predicate(Arc<dyn PermissionPredicate>),
}

impl fmt::Debug for PermissionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionRule::Public => write!(f, "Public"),
            PermissionRule::Roles(roles) => write!(f, "Roles({:?})", roles),
            PermissionRule::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

impl PermissionRule {
    /// Wrap a closure as a predicate rule.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&PermissionContext<'_>) -> bool + Send + Sync + 'static,
    {
        PermissionRule::Predicate(Arc::new(FnPredicate(f)))
    }
}

/// Decide allow or deny for one request. `None` means no rule is configured,
/// which allows unconditionally.
pub async fn evaluate(
    rule: Option<&PermissionRule>,
    ctx: &PermissionContext<'_>,
) -> CorralResult<()> {
    let Some(rule) = rule else {
        return Ok(());
    };

    match rule {
        PermissionRule::Public => Ok(()),

        PermissionRule::Roles(required) => {
            let Some(user) = ctx.user else {
                return Err(CorralError::unauthorized(format!(
                    "authentication required for {} on '{}'",
                    ctx.operation, ctx.collection
                )));
            };
            if user.roles.iter().any(|role| required.contains(role)) {
                Ok(())
            } else {
                Err(CorralError::forbidden(format!(
                    "{} on '{}' requires one of roles {:?}",
                    ctx.operation, ctx.collection, required
                )))
            }
        }

        PermissionRule::Predicate(predicate) => {
            if ctx.user.is_none() {
                return Err(CorralError::unauthorized(format!(
                    "authentication required for {} on '{}'",
                    ctx.operation, ctx.collection
                )));
            }
            if predicate.allow(ctx).await {
                Ok(())
            } else {
                Err(CorralError::forbidden(format!(
                    "{} on '{}' denied",
                    ctx.operation, ctx.collection
                )))
            }
        }
    }
}
