//! # Trellis Lambda
//!
//! AWS Lambda transport adapter for Trellis applications.
//!
//! API Gateway proxy events are dispatched on their own path, method, query
//! string and body, and answered with a proxy response object. Any other
//! event is routed through an interceptor, the configured route or `GET /`,
//! and answered with the rendered body.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trellis_lambda::{LambdaServer, LambdaServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lambda_runtime::Error> {
//!     trellis_lambda::init_tracing();
//!
//!     LambdaServer::new::<AppModule>(LambdaServerConfig::default())?
//!         .with_interceptor(|event, forward| {
//!             if event.is_gateway_proxy_auth_event {
//!                 forward.forward("/authorize", "POST");
//!             }
//!         })
//!         .run()
//!         .await
//! }
//! ```
//!
//! Controllers can inject [`LambdaEvent`] and [`LambdaContext`].

mod error;
mod event;
mod response;
mod runtime;

pub use error::{LambdaError, Result};
pub use event::{
    Forwarder, InterceptedEvent, LambdaContext, LambdaEvent, is_gateway_proxy_auth_event,
    is_gateway_proxy_event, is_routing_event, query_string,
};
pub use response::ProxyResponse;
pub use runtime::{LambdaInterceptor, LambdaServer, LambdaServerConfig};

pub use lambda_runtime;

/// Initialize tracing for Lambda/CloudWatch.
///
/// This sets up structured JSON logging suitable for CloudWatch Logs.
pub fn init_tracing() {
    init_with_filter(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    );
}

/// Initialize tracing with a custom log level.
pub fn init_tracing_with_level(level: &str) {
    init_with_filter(tracing_subscriber::EnvFilter::new(level));
}

fn init_with_filter(filter: tracing_subscriber::EnvFilter) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    // A subscriber installed by the host wins.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
        .try_init();
}
