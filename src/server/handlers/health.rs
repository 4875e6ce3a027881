use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::commands::HELP_TEXT;
use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn health(State(_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let status = state.pipeline.status().await?;
    Ok(Json(status))
}

pub async fn get_help(State(_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "help": HELP_TEXT,
        "commands": ["/status", "/documents", "/process", "/help"]
    }))
}
