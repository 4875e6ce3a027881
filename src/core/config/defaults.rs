use serde_json::{json, Value};

/// Built-in configuration. A `config.yml` is deep-merged over this value, so
/// an operator only has to spell out the keys they change.
pub fn default_config() -> Value {
    json!({
        "llm": {
            "provider": "ollama",
            "base_url": "http://localhost:11434",
            "chat_model": "llama3.2",
            "embedding_model": "mxbai-embed-large",
            "temperature": 0.3,
            "top_p": 0.9,
            "max_tokens": 300,
            "request_timeout_secs": 120,
            "embed_timeout_secs": 60
        },
        "chunking": {
            "chunk_size": 500,
            "chunk_overlap": 50
        },
        "retrieval": {
            "top_k": 4
        },
        "allergens": {
            "confidence_threshold": 0.99
        },
        "extraction": {
            "min_text_chars": 20,
            "ocr_enabled": true,
            "ocr_language": "fra+eng",
            "ocr_dpi": 300,
            "ocr_timeout_secs": 120
        },
        "paths": {},
        "server": {
            "host": "127.0.0.1",
            "port": 8000,
            "cors_allowed_origins": ["http://localhost:3000", "http://127.0.0.1:3000"]
        }
    })
}
