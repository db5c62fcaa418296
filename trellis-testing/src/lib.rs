//! Testing utilities for Trellis applications.
//!
//! - [`fake_http_server`] dispatches requests into a root module without
//!   sockets, through the same resolver the HTTP transports use.
//! - [`fake_controller_action_call`] runs one controller action with its
//!   filters and stages, outside of any routing.
//!
//! ```no_run
//! use trellis_testing::fake_http_server;
//! # struct AppModule;
//! # impl trellis_core::Module for AppModule {
//! #     fn metadata() -> trellis_core::ModuleMetadata { trellis_core::ModuleMetadata::root() }
//! # }
//!
//! # tokio_test::block_on(async {
//! let server = fake_http_server::<AppModule>().unwrap();
//! let response = server.post("/ajax/call", "SENT_FROM_CLIENT").await;
//! assert_eq!(response.status(), 200);
//! # });
//! ```

mod controller_call;
mod fake_server;

pub use controller_call::fake_controller_action_call;
pub use fake_server::{FakeRequestBuilder, FakeResponse, FakeServer, fake_http_server};
