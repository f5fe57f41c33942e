use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::settings::AppConfig;
use super::validation::{validate_document, validate_settings};
use crate::core::errors::RagError;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 8] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "token_",
    "credential",
    "access_key",
    "bearer",
];

const SENSITIVE_WHITELIST: [&str; 3] = ["max_tokens", "total_tokens", "tokens"];

/// Environment variables that override individual config keys.
const ENV_OVERRIDES: [(&str, &[&str]); 5] = [
    ("OPENAI_API_KEY", &["llm", "api_key"]),
    ("OPENAI_BASE_URL", &["llm", "base_url"]),
    ("BERKSHIRE_SOURCE_DIR", &["source", "dir"]),
    ("BERKSHIRE_CHAT_MODEL", &["llm", "chat_model"]),
    ("BERKSHIRE_EMBEDDING_MODEL", &["embedding", "model"]),
];

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
    config_override: Option<PathBuf>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self {
            paths,
            config_override: None,
        }
    }

    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_override = path;
        self
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config_path(&self) -> PathBuf {
        if let Some(path) = &self.config_override {
            return path.clone();
        }

        if let Ok(path) = env::var("BERKSHIRE_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.paths.secrets_path.clone()
    }

    /// Merged `config.yml` + `secrets.yaml` + environment, before typing.
    pub fn load_document(&self) -> Result<Value, RagError> {
        dotenvy::dotenv().ok();

        let public_config = load_yaml_file(&self.config_path())?;
        let secrets_config = load_yaml_file(&self.secrets_path())?;
        let mut merged = deep_merge(&public_config, &secrets_config);
        apply_env_overrides(&mut merged, |key| env::var(key).ok());
        Ok(merged)
    }

    pub fn load(&self) -> Result<AppConfig, RagError> {
        let document = self.load_document()?;
        parse_config(&document)
    }

    pub fn redact_sensitive_values(&self, value: &Value) -> Value {
        redact_sensitive_values(value)
    }
}

pub fn parse_config(document: &Value) -> Result<AppConfig, RagError> {
    validate_document(document)?;
    let config: AppConfig =
        serde_json::from_value(document.clone()).map_err(RagError::configuration)?;
    validate_settings(&config)?;
    Ok(config)
}

fn load_yaml_file(path: &Path) -> Result<Value, RagError> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        RagError::Configuration(format!("cannot read {}: {}", path.display(), e))
    })?;
    let value = serde_yaml::from_str::<Value>(&contents).map_err(|e| {
        RagError::Configuration(format!("invalid YAML in {}: {}", path.display(), e))
    })?;

    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(RagError::Configuration(format!(
            "{} must contain a mapping at the top level",
            path.display()
        ))),
    }
}

fn apply_env_overrides(document: &mut Value, lookup: impl Fn(&str) -> Option<String>) {
    for (var, path) in ENV_OVERRIDES {
        let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        set_path(document, path, Value::String(value));
    }
}

fn set_path(document: &mut Value, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut cursor = document;
    for key in parents {
        if !cursor.is_object() {
            *cursor = Value::Object(Map::new());
        }
        let Some(map) = cursor.as_object_mut() else {
            return;
        };
        cursor = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !cursor.is_object() {
        *cursor = Value::Object(Map::new());
    }
    if let Some(map) = cursor.as_object_mut() {
        map.insert(last.to_string(), value);
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                let is_set = !val.is_null() && val.as_str() != Some("");
                if is_sensitive_key(key) && is_set {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    if SENSITIVE_WHITELIST
        .iter()
        .any(|allowed| *allowed == key_lower)
    {
        return false;
    }
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_merges_objects_and_overrides_scalars() {
        let base = json!({
            "llm": { "chat_model": "gpt-4o", "base_url": "https://api.openai.com" },
            "ingestion": { "batch_size": 50 }
        });
        let secrets = json!({
            "llm": { "api_key": "sk-test" },
            "ingestion": { "batch_size": 10 }
        });

        let merged = deep_merge(&base, &secrets);

        assert_eq!(
            merged,
            json!({
                "llm": {
                    "chat_model": "gpt-4o",
                    "base_url": "https://api.openai.com",
                    "api_key": "sk-test"
                },
                "ingestion": { "batch_size": 10 }
            })
        );
    }

    #[test]
    fn env_overrides_create_missing_sections() {
        let mut doc = json!({ "llm": { "chat_model": "gpt-4o" } });
        apply_env_overrides(&mut doc, |key| match key {
            "OPENAI_API_KEY" => Some("sk-env".to_string()),
            "BERKSHIRE_SOURCE_DIR" => Some("/srv/letters".to_string()),
            "BERKSHIRE_CHAT_MODEL" => Some("  ".to_string()),
            _ => None,
        });

        assert_eq!(doc["llm"]["api_key"], "sk-env");
        assert_eq!(doc["llm"]["chat_model"], "gpt-4o");
        assert_eq!(doc["source"]["dir"], "/srv/letters");
    }

    #[test]
    fn redact_sensitive_values_replaces_secrets_only() {
        let input = json!({
            "llm": {
                "api_key": "sk-live",
                "max_tokens": 512,
                "chat_model": "gpt-4o"
            },
            "other": [{ "password": "pw" }]
        });

        let redacted = redact_sensitive_values(&input);

        assert_eq!(
            redacted,
            json!({
                "llm": {
                    "api_key": "****",
                    "max_tokens": 512,
                    "chat_model": "gpt-4o"
                },
                "other": [{ "password": "****" }]
            })
        );
    }

    #[test]
    fn load_reads_yaml_and_secrets() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = Arc::new(AppPaths::with_dirs(
            tmp.path().to_path_buf(),
            tmp.path().join("state"),
        ));
        fs::write(
            tmp.path().join("config.yml"),
            "chunking:\n  target_size: 800\n  overlap_size: 100\n",
        )
        .unwrap();
        fs::write(&paths.secrets_path, "llm:\n  api_key: sk-file\n").unwrap();

        let service =
            ConfigService::new(paths).with_config_path(Some(tmp.path().join("config.yml")));
        let document = service.load_document().unwrap();

        assert_eq!(document["chunking"]["target_size"], 800);
        assert!(document["llm"]["api_key"].is_string());
    }

    #[test]
    fn invalid_yaml_is_a_configuration_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.yml");
        fs::write(&path, "chunking: [unclosed").unwrap();

        let err = load_yaml_file(&path).unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }
}
