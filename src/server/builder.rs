//! ServerBuilder for fluent API to build corral HTTP servers

use super::handlers::{AppState, CollectionRegistry};
use super::router::build_router;
use crate::config::{CollectionConfig, CorralConfig};
use crate::core::crud::CollectionEngine;
use crate::core::hooks::CollectionHooks;
use crate::core::schema::SchemaAdapter;
use crate::core::store::DocumentStore;
use anyhow::Result;
use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;

struct CollectionSpec {
    name: String,
    schema: Arc<dyn SchemaAdapter>,
    config: CollectionConfig,
    hooks: Option<Arc<dyn CollectionHooks>>,
}

/// Builder wiring collections, store, and configuration into a router
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_store(MemoryStore::new())
///     .register_collection("users", user_schema)
///     .build()?;
/// ```
pub struct ServerBuilder {
    store: Option<Arc<dyn DocumentStore>>,
    production: bool,
    specs: Vec<CollectionSpec>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            production: false,
            specs: Vec::new(),
        }
    }

    /// Set the document store (required)
    pub fn with_store(mut self, store: impl DocumentStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Hide internal error messages from clients
    pub fn production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Register a collection with default configuration (everything allowed,
    /// default list options).
    pub fn register_collection(
        self,
        name: impl Into<String>,
        schema: impl SchemaAdapter + 'static,
    ) -> Self {
        self.register_collection_with(name, schema, CollectionConfig::default())
    }

    /// Register a collection with explicit permissions and list options.
    pub fn register_collection_with(
        mut self,
        name: impl Into<String>,
        schema: impl SchemaAdapter + 'static,
        config: CollectionConfig,
    ) -> Self {
        self.specs.push(CollectionSpec {
            name: name.into(),
            schema: Arc::new(schema),
            config,
            hooks: None,
        });
        self
    }

    /// Attach lifecycle hooks to an already-registered collection.
    pub fn with_collection_hooks(
        mut self,
        name: &str,
        hooks: impl CollectionHooks + 'static,
    ) -> Self {
        if let Some(spec) = self.specs.iter_mut().find(|s| s.name == name) {
            spec.hooks = Some(Arc::new(hooks));
        } else {
            tracing::warn!(collection = %name, "hooks attached to unregistered collection");
        }
        self
    }

    /// Apply a loaded configuration file.
    ///
    /// Sets the production flag and overrides permissions and list options for
    /// registered collections by name. Collections named in the file but not
    /// registered in code are rejected, since no schema exists for them.
    pub fn apply_config(mut self, config: CorralConfig) -> Result<Self> {
        self.production = config.production;
        for file in config.collections {
            let (name, resolved) = file.into_config()?;
            let spec = self
                .specs
                .iter_mut()
                .find(|s| s.name == name)
                .ok_or_else(|| {
                    anyhow::anyhow!("config names unregistered collection '{}'", name)
                })?;
            spec.config = resolved;
        }
        Ok(self)
    }

    /// Build the final router with CRUD routes for every registered collection.
    pub fn build(self) -> Result<Router> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("DocumentStore is required. Call .with_store()"))?;

        let mut registry = CollectionRegistry::new();
        for spec in self.specs {
            let mut engine =
                CollectionEngine::new(&spec.name, store.clone(), spec.schema, spec.config);
            if let Some(hooks) = spec.hooks {
                engine = engine.with_hooks(hooks);
            }
            tracing::info!(collection = %engine.name(), "collection registered");
            registry.register(engine);
        }

        let state = AppState {
            registry: Arc::new(registry),
            production: self.production,
        };
        Ok(build_router(state))
    }

    /// Serve the application with graceful shutdown
    ///
    /// Binds the address, serves requests, and handles SIGTERM and Ctrl+C.
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
