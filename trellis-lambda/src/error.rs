//! Lambda error types.

use thiserror::Error;

/// Result type for Lambda operations.
pub type Result<T> = std::result::Result<T, LambdaError>;

/// Lambda adapter errors.
#[derive(Debug, Error)]
pub enum LambdaError {
    /// Failure raised by the request engine outside of request rendering,
    /// e.g. a non-root bootstrap module.
    #[error("Application error: {0}")]
    Application(#[from] trellis_core::Error),

    /// Response conversion error.
    #[error("Response conversion error: {0}")]
    Response(String),

    /// Lambda runtime error.
    #[error("Lambda runtime error: {0}")]
    Runtime(String),
}

impl From<lambda_runtime::Error> for LambdaError {
    fn from(err: lambda_runtime::Error) -> Self {
        Self::Runtime(err.to_string())
    }
}
