// Transport configuration

use crate::Stage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Options of the HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Interface to bind, all interfaces when absent.
    pub hostname: Option<String>,
    /// Optional stages every controller run executes. `Action` always runs.
    #[serde(alias = "actions")]
    pub stages: Vec<Stage>,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn stages(mut self, stages: impl Into<Vec<Stage>>) -> Self {
        self.stages = stages.into();
        self
    }

    /// Address to bind, as `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.hostname.as_deref().unwrap_or("0.0.0.0"), self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            hostname: None,
            stages: Stage::ALL.to_vec(),
        }
    }
}

/// Options of the HTTPS transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpsConfig {
    #[serde(flatten)]
    pub server: ServerConfig,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl HttpsConfig {
    pub fn new(server: ServerConfig, cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            server,
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }
}
