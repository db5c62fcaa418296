// Environment variable loading

use crate::loader::scalar;
use crate::{ConfigError, Result};
use serde_json::{Map, Value};
use std::env;

/// Prefix of the variables read by default, e.g. `TRELLIS_PORT`.
pub const DEFAULT_PREFIX: &str = "TRELLIS";

/// Reads prefixed environment variables into configuration keys.
/// `TRELLIS_PORT=9000` becomes the key `port` with the number `9000`.
#[derive(Debug, Clone)]
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Collect every variable carrying the prefix.
    pub fn load(&self) -> Map<String, Value> {
        self.collect(env::vars())
    }

    pub(crate) fn collect(&self, vars: impl Iterator<Item = (String, String)>) -> Map<String, Value> {
        let marker = format!("{}_", self.prefix);
        vars.filter_map(|(key, value)| {
            let key = key.strip_prefix(&marker)?;
            (!key.is_empty()).then(|| (key.to_lowercase(), scalar(&value)))
        })
        .collect()
    }

    /// Read one variable, `key` being given without the prefix.
    pub fn load_var(&self, key: &str) -> Result<String> {
        env::var(format!("{}_{}", self.prefix, key.to_uppercase())).map_err(ConfigError::EnvError)
    }

    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}
