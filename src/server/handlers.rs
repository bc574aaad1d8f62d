//! HTTP handlers for collection CRUD operations
//!
//! One generic handler per verb; the collection is resolved from the path at
//! request time, so a single route set serves every registered collection.
//! The authenticated user, if any, is read from request extensions — how it
//! got there (middleware, gateway header, test fixture) is not this module's
//! concern.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::auth::AuthUser;
use crate::core::crud::{CollectionEngine, OperationResult};
use crate::core::error::{CorralError, CorralResult, ErrorBody, ErrorResponse};
use crate::core::query::PaginationMeta;

/// Registry mapping collection names to their wired engines.
#[derive(Default)]
pub struct CollectionRegistry {
    engines: HashMap<String, Arc<CollectionEngine>>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, engine: CollectionEngine) {
        self.engines
            .insert(engine.name().to_string(), Arc::new(engine));
    }

    pub fn get(&self, name: &str) -> Option<Arc<CollectionEngine>> {
        self.engines.get(name).cloned()
    }

    pub fn collection_names(&self) -> Vec<&str> {
        self.engines.keys().map(String::as_str).collect()
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<CollectionRegistry>,
    /// Replace internal error messages with a generic string on the wire.
    pub production: bool,
}

/// Wire shape for successful responses: `{"data": ..., "meta"?: ...}`
#[derive(Debug, Serialize)]
struct DataResponse {
    data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<PaginationMeta>,
}

fn unknown_collection(name: &str) -> Response {
    let body = ErrorResponse {
        error: ErrorBody {
            code: "UNKNOWN_COLLECTION".to_string(),
            message: format!("no collection named '{}'", name),
            details: None,
        },
    };
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

fn respond(result: CorralResult<OperationResult>, production: bool) -> Response {
    match result {
        Ok(OperationResult::Completed { status, data, meta }) => {
            (status, Json(DataResponse { data, meta })).into_response()
        }
        Ok(OperationResult::Handled) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err, production),
    }
}

fn error_response(err: CorralError, production: bool) -> Response {
    if let CorralError::Internal(msg) = &err {
        tracing::error!(error = %msg, "internal engine error");
    }
    (err.status_code(), Json(err.to_response(production))).into_response()
}

fn current_user(user: Option<Extension<AuthUser>>) -> Option<AuthUser> {
    user.map(|Extension(u)| u)
}

/// GET /{collection}
pub async fn list_records(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(params): Query<IndexMap<String, String>>,
    user: Option<Extension<AuthUser>>,
) -> Response {
    let Some(engine) = state.registry.get(&collection) else {
        return unknown_collection(&collection);
    };
    let user = current_user(user);
    respond(engine.list(&params, user.as_ref()).await, state.production)
}

/// GET /{collection}/{id}
pub async fn get_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Query(params): Query<IndexMap<String, String>>,
    user: Option<Extension<AuthUser>>,
) -> Response {
    let Some(engine) = state.registry.get(&collection) else {
        return unknown_collection(&collection);
    };
    let user = current_user(user);
    respond(
        engine.get(&id, &params, user.as_ref()).await,
        state.production,
    )
}

/// POST /{collection}
pub async fn create_record(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    user: Option<Extension<AuthUser>>,
    Json(body): Json<Value>,
) -> Response {
    let Some(engine) = state.registry.get(&collection) else {
        return unknown_collection(&collection);
    };
    let user = current_user(user);
    respond(engine.create(body, user.as_ref()).await, state.production)
}

/// PUT /{collection}/{id}
pub async fn replace_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    user: Option<Extension<AuthUser>>,
    Json(body): Json<Value>,
) -> Response {
    let Some(engine) = state.registry.get(&collection) else {
        return unknown_collection(&collection);
    };
    let user = current_user(user);
    respond(
        engine.replace(&id, body, user.as_ref()).await,
        state.production,
    )
}

/// PATCH /{collection}/{id}
pub async fn patch_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    user: Option<Extension<AuthUser>>,
    Json(body): Json<Value>,
) -> Response {
    let Some(engine) = state.registry.get(&collection) else {
        return unknown_collection(&collection);
    };
    let user = current_user(user);
    respond(
        engine.patch(&id, body, user.as_ref()).await,
        state.production,
    )
}

/// DELETE /{collection}/{id}
pub async fn delete_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    user: Option<Extension<AuthUser>>,
) -> Response {
    let Some(engine) = state.registry.get(&collection) else {
        return unknown_collection(&collection);
    };
    let user = current_user(user);
    respond(engine.delete(&id, user.as_ref()).await, state.production)
}
