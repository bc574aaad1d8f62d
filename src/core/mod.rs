//! Core module containing the query, permission, hook, and orchestration machinery

pub mod auth;
pub mod crud;
pub mod error;
pub mod filter;
pub mod hooks;
pub mod query;
pub mod schema;
pub mod store;

pub use auth::{AuthUser, LogicalOperation, PermissionContext, PermissionRule};
pub use crud::{CollectionEngine, OperationResult};
pub use error::{CorralError, CorralResult};
pub use filter::{FilterLimits, FilterOp, FilterParser, FilterPredicate, FilterValue};
pub use hooks::{CollectionHooks, HookContext, HookStage};
pub use query::{PaginationMeta, QueryBuilder, QueryDescriptor, SortOrder};
pub use schema::{FieldDef, FieldType, SchemaAdapter, StaticSchema, ValidationOutcome};
pub use store::DocumentStore;
