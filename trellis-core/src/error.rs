// Error types for the Trellis request engine

use serde_json::Value;
use thiserror::Error;

/// Result alias used across the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the engine can observe.
///
/// `Routing` is the recoverable kind: it carries the HTTP status the
/// response should use together with a message and a structured context
/// (for example the resolved route that failed). Any other variant is
/// normalized into a `Routing` error with status 500 before rendering.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Error: {message}")]
    Routing {
        status: u16,
        message: String,
        context: Value,
    },

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Dependency injection error: {0}")]
    DependencyInjection(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a routing error with an explicit status code.
    pub fn routing(status: u16, message: impl Into<String>, context: Value) -> Self {
        Error::Routing {
            status,
            message: message.into(),
            context,
        }
    }

    /// The error rendered when a controller stage asks for the current error
    /// and nothing has failed.
    pub fn empty() -> Self {
        Error::routing(500, "", Value::Object(Default::default()))
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Routing { status, .. } => *status,
            _ => 500,
        }
    }

    /// The bare message, without the `Error: ` prefix used by `Display`.
    pub fn message(&self) -> String {
        match self {
            Error::Routing { message, .. } => message.clone(),
            Error::Internal(msg)
            | Error::Transport(msg)
            | Error::DependencyInjection(msg)
            | Error::ProviderNotFound(msg)
            | Error::Config(msg) => msg.clone(),
        }
    }

    /// Structured context attached to routing errors.
    pub fn context(&self) -> Option<&Value> {
        match self {
            Error::Routing { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn is_routing(&self) -> bool {
        matches!(self, Error::Routing { .. })
    }

    /// Wrap anything that is not already a routing error into a 500 routing
    /// error that keeps the original message.
    pub fn normalize(self) -> Self {
        match self {
            routing @ Error::Routing { .. } => routing,
            other => Error::routing(500, other.message(), Value::Object(Default::default())),
        }
    }

    /// Record the route the error was raised for in its context.
    pub fn with_context_entry(mut self, key: &str, value: Value) -> Self {
        if let Error::Routing { context, .. } = &mut self {
            match context {
                Value::Object(map) => {
                    map.insert(key.to_string(), value);
                }
                Value::Null => {
                    let mut map = serde_json::Map::new();
                    map.insert(key.to_string(), value);
                    *context = Value::Object(map);
                }
                _ => {}
            }
        }
        self
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<hyper::Error> for Error {
    fn from(err: hyper::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
