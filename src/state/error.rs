use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] anyhow::Error),

    #[error("Documents directory is missing: {0}")]
    DocumentsDir(String),

    #[error("Model server is not reachable: {0}")]
    ModelServer(String),

    #[error("Failed to open vector store: {0}")]
    Store(#[source] anyhow::Error),
}
