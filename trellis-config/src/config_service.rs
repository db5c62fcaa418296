// Layered configuration service

use crate::{ConfigError, ConfigLoader, EnvLoader, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use trellis_core::{HttpsConfig, ServerConfig};

/// Merged configuration. Later layers override earlier ones key by key:
/// files in the order given, then `.env`, then the process environment.
///
/// Register it as a shared provider to make it injectable.
#[derive(Debug, Clone, Default)]
pub struct ConfigService {
    values: Arc<Map<String, Value>>,
}

impl ConfigService {
    pub fn builder() -> ConfigServiceBuilder {
        ConfigServiceBuilder::default()
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::DeserializationError(format!("{}: {}", key, e)))
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Deserialize the whole configuration into `T`.
    pub fn extract<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object((*self.values).clone()))
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }

    /// HTTP transport options; missing keys take their defaults.
    pub fn server_config(&self) -> Result<ServerConfig> {
        self.extract()
    }

    /// HTTPS transport options; `cert_path` and `key_path` are required.
    pub fn https_config(&self) -> Result<HttpsConfig> {
        self.extract()
    }
}

/// Builder for [`ConfigService`]
#[derive(Debug, Default)]
pub struct ConfigServiceBuilder {
    files: Vec<PathBuf>,
    dotenv: Option<Option<PathBuf>>,
    env: Option<EnvLoader>,
    overrides: Map<String, Value>,
}

impl ConfigServiceBuilder {
    /// Add a JSON, TOML or `.env` file.
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.files.push(path.as_ref().to_path_buf());
        self
    }

    /// Load a dotenv file (`.env` in the working directory when `None`).
    pub fn dotenv(mut self, path: Option<&Path>) -> Self {
        self.dotenv = Some(path.map(Path::to_path_buf));
        self
    }

    /// Read `TRELLIS_*` variables.
    pub fn env(self) -> Self {
        self.env_with(EnvLoader::default())
    }

    pub fn env_with(mut self, loader: EnvLoader) -> Self {
        self.env = Some(loader);
        self
    }

    /// Set a value that overrides every other layer.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<ConfigService> {
        let mut values = Map::new();

        for path in &self.files {
            let layer = ConfigLoader::load_file(path)?;
            debug!(path = %path.display(), keys = layer.len(), "Configuration file loaded");
            values.extend(layer);
        }

        match &self.dotenv {
            Some(Some(path)) => {
                dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
            }
            Some(None) => {
                // A missing default .env is not an error.
                dotenvy::dotenv().ok();
            }
            None => {}
        }

        if let Some(loader) = &self.env {
            let layer = loader.load();
            debug!(keys = layer.len(), "Environment configuration loaded");
            values.extend(layer);
        }

        values.extend(self.overrides);
        Ok(ConfigService::from_map(values))
    }
}
