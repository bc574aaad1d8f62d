//! Server module binding collection engines to HTTP
//!
//! The [`ServerBuilder`] wires a store, schemas, and per-collection
//! configuration into an axum router with uniform CRUD routes.

pub mod builder;
pub mod handlers;
pub mod router;

pub use builder::ServerBuilder;
pub use handlers::{AppState, CollectionRegistry};
pub use router::build_router;
