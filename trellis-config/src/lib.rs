// Configuration loading for Trellis servers

pub mod config_service;
pub mod env;
pub mod error;
pub mod loader;

pub use config_service::{ConfigService, ConfigServiceBuilder};
pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
