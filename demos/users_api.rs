//! Minimal runnable API: one `users` collection over the in-memory store.
//!
//! ```bash
//! cargo run --example users_api
//! curl 'localhost:3000/users?age__gte=18&sort=-age&limit=2'
//! curl -X POST localhost:3000/users -H 'content-type: application/json' \
//!   -d '{"name": "Grace", "email": "grace@example.com", "age": 45}'
//! ```

use corral::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let schema = StaticSchema::new()
        .field("name", FieldDef::required(FieldType::String))
        .field("email", FieldDef::required(FieldType::String))
        .field("age", FieldDef::optional(FieldType::Number))
        .field("active", FieldDef::optional(FieldType::Boolean));

    let config = CollectionConfig::new()
        .permission("read", PermissionRule::Public)
        .permission("delete", PermissionRule::Roles(vec!["admin".to_string()]))
        .list_options(ListOptions {
            allowed_sort_fields: Some(vec!["name".to_string(), "age".to_string()]),
            default_sort: Some("name".to_string()),
            ..ListOptions::default()
        });

    let store = MemoryStore::new();
    store
        .seed(
            "users",
            vec![
                json!({"name": "Ada", "email": "ada@example.com", "age": 36, "active": true}),
                json!({"name": "Brian", "email": "brian@example.com", "age": 17, "active": false}),
            ],
        )
        .await?;

    ServerBuilder::new()
        .with_store(store)
        .register_collection_with("users", schema, config)
        .serve("127.0.0.1:3000")
        .await
}
