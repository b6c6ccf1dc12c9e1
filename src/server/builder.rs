//! ServerBuilder for fluent API to build the filter HTTP server

use super::router::{FilterState, build_filter_routes};
use crate::config::FilterConfig;
use crate::core::store::RecordStore;
use crate::engine::FilterEngine;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Builder for the filter server
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_config(FilterConfig::default_config())
///     .with_store(InMemoryRecordStore::new())
///     .build()?;
/// ```
pub struct ServerBuilder {
    store: Option<Arc<dyn RecordStore>>,
    configs: Vec<FilterConfig>,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    /// Create a new ServerBuilder
    pub fn new() -> Self {
        Self {
            store: None,
            configs: Vec::new(),
            custom_routes: Vec::new(),
        }
    }

    /// Set the record store (required)
    pub fn with_store(mut self, store: impl RecordStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Add a configuration; several are merged, later ones winning
    pub fn with_config(mut self, config: FilterConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Load and add a YAML configuration file
    pub fn with_config_file(self, path: &str) -> Result<Self> {
        let config = FilterConfig::from_yaml_file(path)?;
        Ok(self.with_config(config))
    }

    /// Add routes served next to the filter routes
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build the engine and shared handler state
    ///
    /// Without any configuration the default workflow collections are served.
    pub fn build_state(&mut self) -> Result<FilterState> {
        let config = match self.configs.len() {
            0 => FilterConfig::default_config(),
            _ => FilterConfig::merge(std::mem::take(&mut self.configs)),
        };
        let engine = FilterEngine::from_config(&config)?;

        let store = self
            .store
            .take()
            .ok_or_else(|| anyhow::anyhow!("RecordStore is required. Call .with_store()"))?;

        Ok(FilterState {
            engine: Arc::new(engine),
            store,
        })
    }

    /// Build the final REST router
    pub fn build(mut self) -> Result<Router> {
        let state = self.build_state()?;
        let mut app = build_filter_routes(state);

        for custom_router in std::mem::take(&mut self.custom_routes) {
            app = app.merge(custom_router);
        }

        Ok(app.layer(TraceLayer::new_for_http()))
    }

    /// Serve the application with graceful shutdown
    ///
    /// This will:
    /// - Bind to the provided address
    /// - Start serving requests
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
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

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryRecordStore;

    #[test]
    fn test_build_without_store_fails() {
        let result = ServerBuilder::new()
            .with_config(FilterConfig::default_config())
            .build();
        let err = result.err().unwrap();
        assert!(err.to_string().contains("RecordStore is required"));
    }

    #[test]
    fn test_build_with_defaults() {
        let mut builder = ServerBuilder::new().with_store(InMemoryRecordStore::new());
        let state = builder.build_state().unwrap();
        assert!(state.engine.schemas().contains("flow_runs"));
    }

    #[test]
    fn test_configs_are_merged() {
        let extra = FilterConfig::from_yaml_str(
            r#"
collections:
  - name: work_queues
    fields:
      - { name: id, type: uuid }
      - { name: name, type: string }
"#,
        )
        .unwrap();

        let mut builder = ServerBuilder::new()
            .with_store(InMemoryRecordStore::new())
            .with_config(FilterConfig::default_config())
            .with_config(extra);
        let state = builder.build_state().unwrap();

        assert!(state.engine.schemas().contains("work_queues"));
        assert!(state.engine.schemas().contains("flows"));
    }

    #[test]
    fn test_invalid_config_fails() {
        let mut config = FilterConfig::default_config();
        config.joins[0].to = "missing".to_string();
        let result = ServerBuilder::new()
            .with_store(InMemoryRecordStore::new())
            .with_config(config)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_config_file() {
        assert!(
            ServerBuilder::new()
                .with_config_file("/nonexistent/flowscope.yaml")
                .is_err()
        );
    }
}
