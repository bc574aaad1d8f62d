//! # Corral
//!
//! A configuration-driven CRUD engine for document collections, exposed over
//! a uniform REST surface.
//!
//! ## Features
//!
//! - **Filter Language**: `age__gte=18`, `name__like=ada`, `tags__in=a,b` —
//!   ten operators, parsed from the query string into a typed predicate
//! - **Injection-Safe**: `$`-prefixed fields and body keys are rejected,
//!   patterns are escaped, operator vocabulary is closed
//! - **Typed Coercion**: filter values coerce through the collection schema
//!   (numbers, booleans, dates) with a safe string fallback
//! - **Permission Rules**: public markers, role lists, or custom async
//!   predicates per logical operation
//! - **Lifecycle Hooks**: before/after hooks around find, create, update,
//!   and delete, with short-circuit support
//! - **Configuration-Based**: per-collection permissions and list options
//!   via YAML
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use corral::prelude::*;
//!
//! let schema = StaticSchema::new()
//!     .field("name", FieldDef::required(FieldType::String))
//!     .field("age", FieldDef::optional(FieldType::Number));
//!
//! let config = CollectionConfig::new()
//!     .permission("delete", PermissionRule::Roles(vec!["admin".into()]));
//!
//! ServerBuilder::new()
//!     .with_store(MemoryStore::new())
//!     .register_collection_with("users", schema, config)
//!     .serve("127.0.0.1:3000")
//!     .await?;
//! ```

pub mod config;
pub mod core;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        auth::{AuthUser, LogicalOperation, PermissionContext, PermissionPredicate, PermissionRule},
        crud::{CollectionEngine, OperationResult},
        error::{CorralError, CorralResult, FieldValidationError},
        filter::{FilterLimits, FilterOp, FilterParser, FilterPredicate, FilterValue},
        hooks::{CollectionHooks, HookContext, HookStage},
        query::{PaginationMeta, QueryBuilder, QueryDescriptor, SortOrder},
        schema::{FieldDef, FieldType, SchemaAdapter, StaticSchema, ValidationOutcome},
        store::DocumentStore,
    };

    // === Storage ===
    pub use crate::storage::MemoryStore;

    // === Config ===
    pub use crate::config::{CollectionConfig, CorralConfig, ListOptions};

    // === Server ===
    pub use crate::server::{AppState, CollectionRegistry, ServerBuilder, build_router};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};
    pub use uuid::Uuid;
}
