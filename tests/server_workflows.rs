//! End-to-end tests over a real HTTP listener.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use trellis::prelude::*;

struct Greeter {
    prefix: String,
}

impl Injectable for Greeter {
    fn create(_scope: &Scope) -> Result<Self> {
        Ok(Greeter {
            prefix: "Hello".to_string(),
        })
    }
}

struct HelloController {
    request: Arc<Request>,
}

impl Controller for HelloController {
    fn metadata() -> ControllerMetadata {
        ControllerMetadata::new("hello")
    }

    fn create(scope: &Scope) -> Result<Self> {
        Ok(HelloController {
            request: scope.get::<Request>()?,
        })
    }

    fn actions(table: &mut ActionTable<Self>) {
        table
            .action("greet", "action_greet")
            .param("name")
            .inject::<Greeter>()
            .sync_handler(|controller, args| {
                controller.request.set_cookie("visited", "1", CookieOptions::default());
                controller.request.set_cookie("lang", "en", CookieOptions::default());
                let greeter = args.service::<Greeter>(1)?;
                Ok(format!("{}, {}!", greeter.prefix, args.param(0)?.unwrap_or("nobody")).into())
            });
        table.action("echo", "action_echo").sync_handler(|controller, _| {
            controller.request.set_status_code(201);
            Ok(ChainValue::Bytes(controller.request.body()))
        });
    }
}

struct AppModule;

impl Module for AppModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::root()
            .controller::<HelloController>()
            .shared_provider(Provider::injectable::<Greeter>())
            .router(
                Router::new()
                    .rule(RouteRule::new(&[HttpMethod::GET], "/hello/:name", "hello/greet"))
                    .rule(RouteRule::new(&[HttpMethod::POST], "/echo", "hello/echo")),
            )
    }
}

async fn send(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    String::from_utf8(buf).unwrap()
}

async fn start() -> trellis::ServerHandle {
    http_server::<AppModule>(ServerConfig::new(0).hostname("127.0.0.1"))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_get_over_http() {
    let server = start().await;
    let response = send(
        server.local_addr(),
        "GET /hello/world HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.to_ascii_lowercase().contains("content-type: text/html"));
    assert!(response.contains("set-cookie: visited=1"));
    assert!(response.contains("set-cookie: lang=en"));
    assert!(response.ends_with("Hello, world!"));
    server.shutdown();
}

#[tokio::test]
async fn test_post_body_over_http() {
    let server = start().await;
    let response = send(
        server.local_addr(),
        "POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 7\r\nConnection: close\r\n\r\npayload",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 201 Created"));
    assert!(response.ends_with("payload"));
    server.shutdown();
}

#[tokio::test]
async fn test_not_found_over_http() {
    let server = start().await;
    let response = send(
        server.local_addr(),
        "GET /missing HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 404 Not Found"));
    assert!(response.ends_with("Error: Router.parseRequest: /missing no route found, method: GET"));
    server.shutdown();
}

struct FeatureModule;

impl Module for FeatureModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new("feature")
    }
}

#[tokio::test]
async fn test_server_requires_root_module() {
    let err = http_server::<FeatureModule>(ServerConfig::new(0))
        .await
        .err()
        .unwrap();
    assert_eq!(err.status_code(), 500);
    assert_eq!(err.message(), "Server must be initialized on the root module");
}
