//! Router builder for collection CRUD routes

use super::handlers::{
    AppState, create_record, delete_record, get_record, list_records, patch_record, replace_record,
};
use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the CRUD routes shared by all registered collections:
/// - GET    /{collection}        - List records (filter/sort/page/project)
/// - POST   /{collection}        - Create a record
/// - GET    /{collection}/{id}   - Fetch one record
/// - PUT    /{collection}/{id}   - Replace a record
/// - PATCH  /{collection}/{id}   - Partially update a record
/// - DELETE /{collection}/{id}   - Delete a record
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/{collection}", get(list_records).post(create_record))
        .route(
            "/{collection}/{id}",
            get(get_record)
                .put(replace_record)
                .patch(patch_record)
                .delete(delete_record),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
