use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::commands::SystemCommand;
use crate::core::errors::ApiError;
use crate::state::AppState;

const MAX_QUESTION_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

fn validate(text: &str, field: &str) -> Result<String, ApiError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", field)));
    }
    if trimmed.chars().count() > MAX_QUESTION_CHARS {
        return Err(ApiError::BadRequest(format!(
            "{} is longer than {} characters",
            field, MAX_QUESTION_CHARS
        )));
    }
    Ok(trimmed.to_string())
}

pub async fn answer(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnswerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let question = validate(&request.question, "question")?;
    let result = state.pipeline.answer(&question).await;
    Ok(Json(result))
}

/// System commands are answered directly; anything else is a question.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = validate(&request.message, "message")?;
    if let Some(command) = SystemCommand::parse(&message) {
        tracing::info!("Running system command /{}", command.name());
        let reply = command.execute(&state.pipeline).await;
        return Ok(Json(json!({
            "kind": "command",
            "command": command.name(),
            "reply": reply
        })));
    }

    let result = state.pipeline.answer(&message).await;
    Ok(Json(json!({
        "kind": "answer",
        "reply": result.answer.clone(),
        "result": result
    })))
}
