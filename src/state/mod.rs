use std::path::PathBuf;
use std::sync::Arc;

use crate::core::config::{AppConfig, AppPaths, ConfigService};
use crate::extract::FallbackExtractor;
use crate::llm::LlmService;
use crate::pipeline::Pipeline;
use crate::rag::{SqliteVectorStore, VectorStore, VectorStoreManager};

pub mod error;

use error::InitializationError;

/// Shared by every route and CLI command.
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: AppConfig,
    pub pipeline: Arc<Pipeline>,
}

#[derive(Debug, Clone, Default)]
pub struct StartupOptions {
    pub config_path: Option<PathBuf>,
    /// Fail when the model server does not answer its health check.
    pub require_model: bool,
}

impl AppState {
    /// Loads the configuration, checks the inbound directory and the model
    /// server, then opens the vector store and builds the pipeline.
    pub async fn initialize(
        paths: AppPaths,
        options: StartupOptions,
    ) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(Arc::new(paths.clone()))
            .with_config_path(options.config_path)
            .load()
            .map_err(|e| InitializationError::Config(e.into()))?;
        let paths = Arc::new(paths.apply_overrides(&config.paths));

        if !paths.documents_dir.is_dir() {
            return Err(InitializationError::DocumentsDir(
                paths.documents_dir.display().to_string(),
            ));
        }
        paths
            .ensure_writable_dirs()
            .map_err(|e| InitializationError::Config(e.into()))?;

        let llm = LlmService::from_config(&config.llm)
            .map_err(|e| InitializationError::Config(e.into()))?;
        if !llm.health_check().await {
            let message = format!("{} at {}", llm.provider_name(), config.llm.base_url);
            if options.require_model {
                return Err(InitializationError::ModelServer(message));
            }
            tracing::warn!("Model server is not reachable: {}", message);
        }

        let store: Arc<dyn VectorStore> = Arc::new(
            SqliteVectorStore::new(paths.as_ref())
                .await
                .map_err(|e| InitializationError::Store(e.into()))?,
        );
        let manager = VectorStoreManager::open(store, llm)
            .await
            .map_err(|e| InitializationError::Store(e.into()))?;

        let extractor = Arc::new(FallbackExtractor::from_config(&config.extraction));
        let pipeline = Arc::new(Pipeline::new(paths.clone(), &config, extractor, manager));

        Ok(Self::from_parts(paths, config, pipeline))
    }

    pub fn from_parts(paths: Arc<AppPaths>, config: AppConfig, pipeline: Arc<Pipeline>) -> Arc<Self> {
        Arc::new(AppState {
            paths,
            config,
            pipeline,
        })
    }

    pub async fn shutdown(&self) {
        self.pipeline.manager().close().await;
        tracing::info!("Vector store closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_documents_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::with_root(dir.path().to_path_buf());
        let result = AppState::initialize(paths, StartupOptions::default()).await;
        assert!(matches!(result, Err(InitializationError::DocumentsDir(_))));
    }

    #[tokio::test]
    async fn invalid_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::with_root(dir.path().to_path_buf());
        std::fs::create_dir_all(&paths.documents_dir).unwrap();
        let config_path = dir.path().join("config.yml");
        std::fs::write(&config_path, "retrieval:\n  top_k: 0\n").unwrap();

        let options = StartupOptions {
            config_path: Some(config_path),
            require_model: false,
        };
        let result = AppState::initialize(paths, options).await;
        assert!(matches!(result, Err(InitializationError::Config(_))));
    }

    #[tokio::test]
    async fn unreachable_model_server_is_fatal_when_required() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::with_root(dir.path().to_path_buf());
        std::fs::create_dir_all(&paths.documents_dir).unwrap();
        let config_path = dir.path().join("config.yml");
        // Port 9 (discard) on loopback refuses connections.
        std::fs::write(&config_path, "llm:\n  base_url: http://127.0.0.1:9\n").unwrap();

        let options = StartupOptions {
            config_path: Some(config_path),
            require_model: true,
        };
        let result = AppState::initialize(paths, options).await;
        assert!(matches!(result, Err(InitializationError::ModelServer(_))));
    }
}
