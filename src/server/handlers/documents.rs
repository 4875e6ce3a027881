use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn list_documents(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let documents = state.pipeline.documents().await?;
    Ok(Json(json!({ "documents": documents })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProcessRequest {
    /// Relative to the documents directory. Every document when absent.
    #[serde(default)]
    pub file: Option<String>,
}

pub async fn process(
    State(state): State<Arc<AppState>>,
    body: Option<Json<ProcessRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    match request.file.as_deref().map(str::trim).filter(|file| !file.is_empty()) {
        Some(file) => {
            let report = state.pipeline.process_document(&PathBuf::from(file)).await?;
            Ok(Json(json!({ "documents": [report] })))
        }
        None => {
            let report = state.pipeline.process_all().await?;
            Ok(Json(json!(report)))
        }
    }
}
