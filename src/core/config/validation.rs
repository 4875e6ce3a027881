use serde_json::{Map, Value};

use crate::core::errors::RagError;

const PROVIDERS: [&str; 2] = ["ollama", "openai_compatible"];

pub fn validate_config(config: &Value) -> Result<(), RagError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(llm) = expect_optional_object(root, "llm")? {
        if let Some(provider) = llm.get("provider") {
            let Some(name) = provider.as_str() else {
                return Err(config_type_error("llm.provider", "string"));
            };
            if !PROVIDERS.contains(&name) {
                return Err(RagError::Configuration(format!(
                    "Invalid config at 'llm.provider': expected one of {}",
                    PROVIDERS.join(", ")
                )));
            }
        }
        validate_required_string_field(llm, "llm.base_url", "base_url")?;
        validate_required_string_field(llm, "llm.chat_model", "chat_model")?;
        validate_required_string_field(llm, "llm.embedding_model", "embedding_model")?;
        validate_f64_field(llm, "llm.temperature", "temperature", 0.0, 2.0)?;
        validate_f64_field(llm, "llm.top_p", "top_p", 0.0, 1.0)?;
        validate_u64_field(llm, "llm.max_tokens", "max_tokens", 1, 32_768)?;
        validate_u64_field(
            llm,
            "llm.request_timeout_secs",
            "request_timeout_secs",
            1,
            3_600,
        )?;
        validate_u64_field(
            llm,
            "llm.embed_timeout_secs",
            "embed_timeout_secs",
            1,
            3_600,
        )?;
    }

    if let Some(chunking) = expect_optional_object(root, "chunking")? {
        validate_u64_field(chunking, "chunking.chunk_size", "chunk_size", 50, 100_000)?;
        validate_u64_field(
            chunking,
            "chunking.chunk_overlap",
            "chunk_overlap",
            0,
            100_000,
        )?;
        let size = chunking.get("chunk_size").and_then(Value::as_u64);
        let overlap = chunking.get("chunk_overlap").and_then(Value::as_u64);
        if let (Some(size), Some(overlap)) = (size, overlap) {
            if overlap >= size {
                return Err(RagError::Configuration(
                    "Invalid config at 'chunking.chunk_overlap': must be smaller than chunk_size"
                        .to_string(),
                ));
            }
        }
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_u64_field(retrieval, "retrieval.top_k", "top_k", 1, 100)?;
    }

    if let Some(allergens) = expect_optional_object(root, "allergens")? {
        validate_f64_field(
            allergens,
            "allergens.confidence_threshold",
            "confidence_threshold",
            0.0,
            1.0,
        )?;
    }

    if let Some(extraction) = expect_optional_object(root, "extraction")? {
        validate_u64_field(
            extraction,
            "extraction.min_text_chars",
            "min_text_chars",
            1,
            10_000,
        )?;
        validate_bool_field(extraction, "extraction.ocr_enabled", "ocr_enabled")?;
        validate_optional_string_field(extraction, "extraction.ocr_language", "ocr_language")?;
        validate_u64_field(extraction, "extraction.ocr_dpi", "ocr_dpi", 72, 1_200)?;
        validate_u64_field(
            extraction,
            "extraction.ocr_timeout_secs",
            "ocr_timeout_secs",
            1,
            3_600,
        )?;
    }

    if let Some(paths) = expect_optional_object(root, "paths")? {
        validate_optional_string_field(paths, "paths.documents_dir", "documents_dir")?;
        validate_optional_string_field(paths, "paths.processed_dir", "processed_dir")?;
        validate_optional_string_field(paths, "paths.data_dir", "data_dir")?;
    }

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 1, 65_535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, RagError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(config_type_error(key, "object")),
    }
}

fn validate_bool_field(section: &Map<String, Value>, path: &str, key: &str) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(out_of_range(path, min, max));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if number < min || number > max {
        return Err(out_of_range(path, min, max));
    }
    Ok(())
}

fn validate_required_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
    let value = section.get(key).ok_or_else(|| {
        RagError::Configuration(format!("Invalid config at '{}': value is required", path))
    })?;
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(RagError::Configuration(format!(
            "Invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
    match section.get(key) {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
        Some(_) => Err(config_type_error(path, "string")),
    }
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(RagError::Configuration(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn out_of_range<T: std::fmt::Display>(path: &str, min: T, max: T) -> RagError {
    RagError::Configuration(format!(
        "Invalid config at '{}': must be between {} and {}",
        path, min, max
    ))
}

fn config_type_error(path: &str, expected: &str) -> RagError {
    RagError::Configuration(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_built_in_defaults() {
        let defaults = crate::core::config::defaults::default_config();
        assert!(validate_config(&defaults).is_ok());
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk_size() {
        let config = json!({ "chunking": { "chunk_size": 200, "chunk_overlap": 200 } });
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("chunking.chunk_overlap"));
    }

    #[test]
    fn rejects_threshold_outside_unit_interval() {
        let config = json!({ "allergens": { "confidence_threshold": 1.5 } });
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_unknown_provider() {
        let config = json!({
            "llm": {
                "provider": "cloud",
                "base_url": "http://localhost:11434",
                "chat_model": "llama3.2",
                "embedding_model": "mxbai-embed-large"
            }
        });
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("llm.provider"));
    }

    #[test]
    fn rejects_non_object_section() {
        let config = json!({ "retrieval": 4 });
        assert!(validate_config(&config).is_err());
    }
}
