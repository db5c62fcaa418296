//! Requests dispatched through the fake server.

use serde_json::{Value, json};
use std::sync::Arc;
use trellis_core::{
    ActionTable, ChainValue, Controller, ControllerMetadata, Error, HeaderValue, HttpMethod,
    Module, ModuleMetadata, Request, Result, RouteRule, Router, Scope,
};
use trellis_testing::{FakeServer, fake_http_server};

struct CoreController {
    request: Arc<Request>,
}

impl Controller for CoreController {
    fn metadata() -> ControllerMetadata {
        ControllerMetadata::new("core")
    }

    fn create(scope: &Scope) -> Result<Self> {
        Ok(CoreController {
            request: scope.get::<Request>()?,
        })
    }

    fn actions(table: &mut ActionTable<Self>) {
        table
            .action("error", "action_error")
            .error()
            .sync_handler(|controller, args| {
                Ok(format!("ERROR={}={}", args.error(0)?.message(), controller.request.route()).into())
            });
        table.action("fire", "action_fire_error").sync_handler(|_, _| {
            Err(Error::routing(500, "FIRE ERROR CASE", json!({})))
        });
        table
            .before("index", "before_index")
            .sync_handler(|_, _| Ok("BEFORE".into()));
        table
            .action("index", "action_index")
            .chain()
            .sync_handler(|_, args| Ok(format!("VALUE <- {}", args.chain(0)?).into()));
        table.action("call", "action_ajax").sync_handler(|controller, _| {
            Ok(format!("CALL={}", String::from_utf8_lossy(&controller.request.body())).into())
        });
        table
            .action("redirect", "action_redirect")
            .sync_handler(|controller, _| {
                controller.request.redirect_to("/mypage", 307);
                Ok(ChainValue::Null)
            });
        table
            .action("user", "action_user")
            .produces("application/json")
            .param("id")
            .sync_handler(|_, args| {
                Ok(ChainValue::Json(json!({ "id": args.param(0)?, "active": true })))
            });
        table
            .action("session", "action_session")
            .sync_handler(|controller, _| {
                let session = controller.request.cookie("session").unwrap_or_default();
                controller.request.set_cookie("seen", "1", Default::default());
                controller.request.set_cookie("theme", "dark", Default::default());
                Ok(format!("session={}", session).into())
            });
        table
            .action("summary", "action_summary")
            .sync_handler(|_, _| Ok(ChainValue::Json(json!({ "total": 3 }))));
    }
}

struct AppModule;

impl Module for AppModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::root().controller::<CoreController>().router(
            Router::new()
                .rule(RouteRule::new(
                    &[
                        HttpMethod::GET,
                        HttpMethod::OPTIONS,
                        HttpMethod::CONNECT,
                        HttpMethod::DELETE,
                        HttpMethod::HEAD,
                        HttpMethod::TRACE,
                    ],
                    "/",
                    "core/index",
                ))
                .rule(RouteRule::new(
                    &[HttpMethod::POST, HttpMethod::PUT, HttpMethod::PATCH],
                    "/ajax/call",
                    "core/call",
                ))
                .rule(RouteRule::new(&[HttpMethod::GET], "/redirect", "core/redirect"))
                .rule(RouteRule::new(&[HttpMethod::GET], "/fire-error", "core/fire"))
                .rule(RouteRule::new(&[HttpMethod::GET], "/users/:id", "core/user"))
                .rule(RouteRule::new(&[HttpMethod::GET], "/session", "core/session"))
                .rule(RouteRule::new(&[HttpMethod::GET], "/summary", "core/summary"))
                .error_route("core/error"),
        )
    }
}

struct ErrorsController {
    request: Arc<Request>,
}

impl Controller for ErrorsController {
    fn metadata() -> ControllerMetadata {
        ControllerMetadata::new("errors")
    }

    fn create(scope: &Scope) -> Result<Self> {
        Ok(ErrorsController {
            request: scope.get::<Request>()?,
        })
    }

    fn actions(table: &mut ActionTable<Self>) {
        table.action("fire", "action_fire").sync_handler(|_, _| {
            Err(Error::routing(500, "FIRE ERROR CASE", json!({})))
        });
        table
            .action("failing", "action_failing")
            .error()
            .sync_handler(|_, _| Err(Error::routing(418, "ERROR ROUTE FAILED", json!({}))));
        table
            .action("custom", "action_custom")
            .error()
            .sync_handler(|controller, _| {
                controller.request.set_status_code(404);
                Ok("custom".into())
            });
    }
}

fn errors_router(error_route: &str) -> Router {
    Router::new()
        .rule(RouteRule::new(&[HttpMethod::GET], "/fire", "errors/fire"))
        .error_route(error_route)
}

struct FailingErrorRouteModule;

impl Module for FailingErrorRouteModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::root()
            .controller::<ErrorsController>()
            .router(errors_router("errors/failing"))
    }
}

struct StatusOverrideModule;

impl Module for StatusOverrideModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::root()
            .controller::<ErrorsController>()
            .router(errors_router("errors/custom"))
    }
}

struct FeatureModule;

impl Module for FeatureModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new("feature")
    }
}

fn server() -> FakeServer {
    fake_http_server::<AppModule>().unwrap()
}

#[tokio::test]
async fn test_get_redirect() {
    let response = server().get("/redirect").await;
    assert_eq!(response.status(), 307);
    assert_eq!(
        response.headers,
        vec![("Location".to_string(), HeaderValue::from("/mypage"))]
    );
}

#[tokio::test]
async fn test_error_route_renders_thrown_error() {
    let response = server().get("/fire-error").await;
    assert!(response.text().contains("ERROR=FIRE ERROR CASE"));
    assert_eq!(response.text(), "ERROR=FIRE ERROR CASE=core/error");
    assert_eq!(response.status(), 500);
}

#[tokio::test]
async fn test_error_route_renders_not_found() {
    let response = server().get("/abc").await;
    assert!(
        response
            .text()
            .contains("ERROR=Router.parseRequest: /abc no route found, method: GET")
    );
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_get_index() {
    let response = server().get("/").await;
    assert_eq!(response.text(), "VALUE <- BEFORE");
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_bodyless_methods() {
    let server = server();
    for response in [
        server.options("/").await,
        server.connect("/").await,
        server.delete("/").await,
        server.head("/").await,
        server.trace("/").await,
    ] {
        assert_eq!(response.text(), "VALUE <- BEFORE");
        assert_eq!(response.status(), 200);
    }
}

#[tokio::test]
async fn test_body_methods() {
    let server = server();
    for response in [
        server.post("/ajax/call", "SENT_FROM_CLIENT").await,
        server.put("/ajax/call", "SENT_FROM_CLIENT").await,
        server.patch("/ajax/call", "SENT_FROM_CLIENT").await,
    ] {
        assert_eq!(response.text(), "CALL=SENT_FROM_CLIENT");
    }
}

#[tokio::test]
async fn test_chunks_are_concatenated_in_order() {
    let response = server()
        .request("POST", "/ajax/call")
        .body("a")
        .body("b")
        .body("c")
        .send()
        .await;
    assert_eq!(response.text(), "CALL=abc");
}

#[tokio::test]
async fn test_json_produces() {
    let response = server().get("/users/42").await;
    assert_eq!(
        response.header("content-type"),
        Some(&HeaderValue::from("application/json"))
    );
    let user: Value = response.json().unwrap();
    assert_eq!(user, json!({"id": "42", "active": true}));
}

#[tokio::test]
async fn test_cookies_round_trip() {
    let response = server()
        .request("GET", "/session")
        .header("Cookie", "session=abc; theme=light")
        .send()
        .await;

    assert_eq!(response.text(), "session=abc");
    assert_eq!(
        response.header("set-cookie"),
        Some(&HeaderValue::Multi(vec!["seen=1".to_string(), "theme=dark".to_string()]))
    );
}

#[tokio::test]
async fn test_json_without_json_content_type() {
    let response = server().get("/summary").await;
    assert_eq!(response.status(), 400);
    assert_eq!(
        response.text(),
        "ERROR=ResponseType must be string or buffer=core/error"
    );

    let response = server().request("GET", "/summary").serverless().send().await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text(), r#"{"total":3}"#);
}

#[test]
fn test_requires_root_module() {
    let err = fake_http_server::<FeatureModule>().err().unwrap();
    assert_eq!(err.status_code(), 500);
    assert_eq!(err.message(), "Fake server must be initialized on the root module");
}

#[tokio::test]
async fn test_failing_error_route_falls_back_to_default_rendering() {
    let server = fake_http_server::<FailingErrorRouteModule>().unwrap();
    let response = server.get("/fire").await;
    assert_eq!(response.status(), 418);
    assert_eq!(response.text(), "Error: ERROR ROUTE FAILED");
}

#[tokio::test]
async fn test_error_route_can_override_status() {
    let server = fake_http_server::<StatusOverrideModule>().unwrap();
    let response = server.get("/fire").await;
    assert_eq!(response.status(), 404);
    assert_eq!(response.text(), "custom");
}
