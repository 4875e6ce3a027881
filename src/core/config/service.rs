use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::defaults::default_config;
use super::paths::AppPaths;
use super::settings::AppConfig;
use super::validation::validate_config;
use crate::core::errors::RagError;

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
    explicit_path: Option<PathBuf>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self {
            paths,
            explicit_path: None,
        }
    }

    /// Uses `path` instead of the discovered location (the `--config` flag).
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.explicit_path = path;
        self
    }

    pub fn config_path(&self) -> PathBuf {
        if let Some(path) = &self.explicit_path {
            return path.clone();
        }

        if let Ok(path) = env::var("PIZZERIA_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        self.paths.project_root.join("config.yml")
    }

    /// Defaults with the config file deep-merged on top, validated.
    pub fn load_config(&self) -> Result<Value, RagError> {
        let path = self.config_path();
        let file_config = load_yaml_file(&path)?;
        let merged = deep_merge(&default_config(), &file_config);
        validate_config(&merged)?;
        Ok(merged)
    }

    pub fn load(&self) -> Result<AppConfig, RagError> {
        let merged = self.load_config()?;
        AppConfig::from_value(merged)
    }
}

fn load_yaml_file(path: &Path) -> Result<Value, RagError> {
    if !path.exists() {
        tracing::info!("No config file at {}, using built-in defaults", path.display());
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path)?;
    let value = serde_yaml::from_str::<Value>(&contents).map_err(|err| {
        RagError::Configuration(format!("failed to parse {}: {}", path.display(), err))
    })?;
    match value {
        Value::Object(_) => Ok(value),
        // An empty YAML document.
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(RagError::Configuration(format!(
            "{} must contain a mapping at the top level",
            path.display()
        ))),
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
