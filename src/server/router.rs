use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{answer, documents, health};
use crate::state::AppState;

/// Application router: health, status, documents, processing and
/// question answering, behind CORS and HTTP tracing.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state);
    Router::new()
        .route("/health", get(health::health))
        .route("/api/status", get(health::get_status))
        .route("/api/help", get(health::get_help))
        .route("/api/documents", get(documents::list_documents))
        .route("/api/process", post(documents::process))
        .route("/api/answer", post(answer::answer))
        .route("/api/chat", post(answer::chat))
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(state: &Arc<AppState>) -> CorsLayer {
    let allowed_origins = resolve_allowed_origins(&state.config.server.cors_allowed_origins)
        .into_iter()
        .filter_map(|origin| match HeaderValue::from_str(&origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}

fn resolve_allowed_origins(configured: &[String]) -> Vec<String> {
    let origins = configured
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.to_string())
        .collect::<Vec<_>>();

    if origins.is_empty() {
        return default_local_origins();
    }

    origins
}

fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
        "http://127.0.0.1".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::core::config::AppConfig;
    use crate::llm::tests::FakeProvider;
    use crate::pipeline::tests::{test_pipeline, write_document, ANCHOR_MENU};

    async fn app(dir: &tempfile::TempDir, reply: &str) -> (Router, Arc<AppState>) {
        let pipeline = Arc::new(test_pipeline(dir, Arc::new(FakeProvider::replying(reply))).await);
        write_document(&pipeline, "anchor_pizza/menu.pdf", ANCHOR_MENU.as_bytes());
        let paths = Arc::new(crate::core::config::AppPaths::with_root(dir.path().to_path_buf()));
        let state = AppState::from_parts(paths, AppConfig::builtin().unwrap(), pipeline);
        (router(state.clone()), state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[test]
    fn empty_origin_list_falls_back_to_local_origins() {
        assert_eq!(resolve_allowed_origins(&[" ".to_string()]), default_local_origins());
        assert_eq!(
            resolve_allowed_origins(&["https://menu.example".to_string()]),
            ["https://menu.example"]
        );
    }

    #[tokio::test]
    async fn health_and_help() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(&dir, "unused").await;

        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send(&app, "GET", "/api/help", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["help"].as_str().unwrap().contains("/process"));
    }

    #[tokio::test]
    async fn process_then_answer() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(&dir, "The Margherita costs $10.").await;

        let (status, body) = send(&app, "POST", "/api/process", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["documents"][0]["status"], "indexed");

        let (status, body) = send(&app, "GET", "/api/documents", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["documents"][0]["processed"], true);

        let (status, body) = send(
            &app,
            "POST",
            "/api/answer",
            Some(serde_json::json!({ "question": "How much is the Margherita at Anchor Pizza?" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["answer"].as_str().unwrap().starts_with("The Margherita costs $10."));
        assert!(!body["sources"].as_array().unwrap().is_empty());
        assert_eq!(body["degraded"], false);
    }

    #[tokio::test]
    async fn process_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(&dir, "unused").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/process",
            Some(serde_json::json!({ "file": "anchor_pizza/menu.pdf" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["documents"][0]["document_id"], "anchor_pizza__menu");

        let (status, _) = send(
            &app,
            "POST",
            "/api/process",
            Some(serde_json::json!({ "file": "nope.pdf" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_routes_commands_and_questions() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(&dir, "We have three pizzas.").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/chat",
            Some(serde_json::json!({ "message": "/documents" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kind"], "command");
        assert_eq!(body["command"], "documents");

        let (_, body) = send(
            &app,
            "POST",
            "/api/chat",
            Some(serde_json::json!({ "message": "What pizzas do you have?" })),
        )
        .await;
        assert_eq!(body["kind"], "answer");
        assert_eq!(body["result"]["has_context"], false);
    }

    #[tokio::test]
    async fn empty_question_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(&dir, "unused").await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/answer",
            Some(serde_json::json!({ "question": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("question"));
    }

    #[tokio::test]
    async fn concurrent_process_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let (app, state) = app(&dir, "unused").await;
        let _held = state.pipeline.hold_processing().await;

        let (status, _) = send(&app, "POST", "/api/process", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
