// Core library of the Trellis request engine
// Module-scoped dependency injection, filters and staged controller actions,
// plus the HTTP and HTTPS transports that feed them.

pub mod action_chain;
pub mod application;
pub mod chain;
pub mod config;
pub mod container;
pub mod context;
pub mod controller_resolver;
pub mod error;
pub mod executor;
pub mod filter;
pub mod http;
pub mod logging;
pub mod metadata;
pub mod module;
pub mod request_resolver;
pub mod routing;
pub mod tls;
pub mod traits;

// Re-export commonly used types
pub use action_chain::*;
pub use application::*;
pub use chain::*;
pub use config::*;
pub use container::*;
pub use context::*;
pub use controller_resolver::*;
pub use error::*;
pub use executor::*;
pub use filter::*;
pub use http::*;
pub use metadata::*;
pub use module::*;
pub use request_resolver::*;
pub use routing::*;
pub use tls::TlsConfig;
pub use traits::*;
