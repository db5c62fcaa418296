// Trellis - a request-dispatch engine for Rust
//
// Routes HTTP, HTTPS and Lambda requests to controller actions running in
// per-request dependency scopes, wrapped by filters and staged hooks.

// Re-export core functionality
pub use trellis_core::*;

// Re-export optional crates
#[cfg(feature = "config")]
pub use trellis_config;

#[cfg(feature = "lambda")]
pub use trellis_lambda;

#[cfg(feature = "testing")]
pub use trellis_testing;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        ActionArgs, ActionTable, ChainValue, Controller, ControllerMetadata, CookieOptions, Error,
        Filter, FilterMetadata, HttpMethod, HttpsConfig, Injectable, Module, ModuleMetadata,
        Provider, Request, Result, RouteRule, Router, Scope, ServerConfig, Stage, http_server,
        https_server,
    };
    pub use async_trait::async_trait;
}
