use serde_json::{Map, Value};

use super::settings::AppConfig;
use crate::core::errors::RagError;

/// Shape checks over the raw merged document, so a typo'd type fails with the
/// offending key path instead of a generic deserialization error.
pub fn validate_document(config: &Value) -> Result<(), RagError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(source) = expect_optional_object(root, "source")? {
        validate_optional_string_field(source, "source.dir", "dir")?;
        validate_optional_string_field(source, "source.extension", "extension")?;
    }

    if let Some(chunking) = expect_optional_object(root, "chunking")? {
        validate_u64_field(chunking, "chunking.target_size", "target_size", 1, 1_000_000)?;
        validate_u64_field(chunking, "chunking.overlap_size", "overlap_size", 0, 1_000_000)?;
    }

    if let Some(ingestion) = expect_optional_object(root, "ingestion")? {
        validate_u64_field(ingestion, "ingestion.batch_size", "batch_size", 1, 10_000)?;
        validate_u64_field(
            ingestion,
            "ingestion.extract_concurrency",
            "extract_concurrency",
            1,
            64,
        )?;
        validate_u64_field(
            ingestion,
            "ingestion.extract_timeout_secs",
            "extract_timeout_secs",
            1,
            86_400,
        )?;
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_optional_string_field(embedding, "embedding.model", "model")?;
        validate_u64_field(embedding, "embedding.dimension", "dimension", 1, 65_536)?;
        validate_u64_field(embedding, "embedding.max_attempts", "max_attempts", 1, 20)?;
        validate_u64_field(
            embedding,
            "embedding.retry_base_delay_ms",
            "retry_base_delay_ms",
            0,
            60_000,
        )?;
    }

    if let Some(store) = expect_optional_object(root, "vector_store")? {
        validate_optional_string_field(store, "vector_store.path", "path")?;
        validate_optional_string_field(store, "vector_store.index_name", "index_name")?;
        validate_u64_field(
            store,
            "vector_store.acquire_timeout_secs",
            "acquire_timeout_secs",
            1,
            3_600,
        )?;
    }

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_optional_string_field(llm, "llm.base_url", "base_url")?;
        validate_optional_string_field(llm, "llm.api_key", "api_key")?;
        validate_optional_string_field(llm, "llm.chat_model", "chat_model")?;
        validate_u64_field(
            llm,
            "llm.request_timeout_secs",
            "request_timeout_secs",
            1,
            3_600,
        )?;
        validate_u64_field(
            llm,
            "llm.requests_per_minute",
            "requests_per_minute",
            1,
            100_000,
        )?;
    }

    if let Some(agent) = expect_optional_object(root, "agent")? {
        validate_u64_field(agent, "agent.max_steps", "max_steps", 1, 32)?;
        validate_u64_field(agent, "agent.history_limit", "history_limit", 0, 1_000)?;
        validate_u64_field(agent, "agent.default_top_k", "default_top_k", 1, 100)?;
        validate_u64_field(agent, "agent.max_top_k", "max_top_k", 1, 100)?;
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

/// Cross-field rules that only make sense on the typed config.
pub fn validate_settings(config: &AppConfig) -> Result<(), RagError> {
    if config.llm.api_key.trim().is_empty() {
        return Err(RagError::Configuration(
            "llm.api_key is not set (set OPENAI_API_KEY or add it to secrets.yaml)".to_string(),
        ));
    }
    if config.llm.base_url.trim().is_empty() {
        return Err(RagError::Configuration("llm.base_url cannot be empty".to_string()));
    }
    if config.embedding.model.trim().is_empty() {
        return Err(RagError::Configuration(
            "embedding.model cannot be empty".to_string(),
        ));
    }
    if config.vector_store.index_name.trim().is_empty() {
        return Err(RagError::Configuration(
            "vector_store.index_name cannot be empty".to_string(),
        ));
    }
    if config.chunking.overlap_size >= config.chunking.target_size {
        return Err(RagError::Configuration(format!(
            "chunking.overlap_size ({}) must be smaller than chunking.target_size ({})",
            config.chunking.overlap_size, config.chunking.target_size
        )));
    }
    if config.agent.default_top_k > config.agent.max_top_k {
        return Err(RagError::Configuration(format!(
            "agent.default_top_k ({}) exceeds agent.max_top_k ({})",
            config.agent.default_top_k, config.agent.max_top_k
        )));
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
    if value.is_null() {
        return Ok(());
    }
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(RagError::Configuration(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.is_null() || value.is_string() {
        return Ok(());
    }
    Err(config_type_error(path, "string"))
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

    fn configured() -> AppConfig {
        let mut config = AppConfig::default();
        config.llm.api_key = "sk-test".to_string();
        config
    }

    #[test]
    fn accepts_empty_document() {
        assert!(validate_document(&json!({})).is_ok());
    }

    #[test]
    fn rejects_wrong_types_with_key_path() {
        let err = validate_document(&json!({ "ingestion": { "batch_size": "fifty" } }))
            .unwrap_err();
        assert!(err.to_string().contains("ingestion.batch_size"));

        let err = validate_document(&json!({ "llm": [] })).unwrap_err();
        assert!(err.to_string().contains("'llm'"));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = validate_document(&json!({ "ingestion": { "batch_size": 0 } })).unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[test]
    fn missing_api_key_is_fatal() {
        let err = validate_settings(&AppConfig::default()).unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
        assert!(validate_settings(&configured()).is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_target() {
        let mut config = configured();
        config.chunking.target_size = 100;
        config.chunking.overlap_size = 100;
        assert!(validate_settings(&config).is_err());
    }
}
