// Tests for request dispatch through fire_request

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use trellis_core::{
    ActionTable, ChainValue, Controller, ControllerMetadata, Error, HeaderValue, HttpMethod,
    IncomingRequest, Module, ModuleInjector, ModuleMetadata, Provider, Request, RequestBody, Result,
    RouteRule, Router, Scope, ServerResponse, Stage, fire_request,
};

struct Probe(Arc<AtomicBool>);

struct Pages {
    request: Arc<Request>,
}

impl Controller for Pages {
    fn metadata() -> ControllerMetadata {
        ControllerMetadata::new("pages")
    }

    fn create(scope: &Scope) -> Result<Self> {
        Ok(Pages {
            request: scope.get::<Request>()?,
        })
    }

    fn actions(table: &mut ActionTable<Self>) {
        table
            .before_each("before_each")
            .sync_handler(|_, _| Ok("each".into()));
        table
            .action("show", "show")
            .param("id")
            .param("lang")
            .chain()
            .sync_handler(|_, args| {
                Ok(format!(
                    "{}:{}:{}",
                    args.param(0)?.unwrap_or("-"),
                    args.param(1)?.unwrap_or("-"),
                    args.chain(2)?
                )
                .into())
            });
        table.action("echo", "echo").sync_handler(|pages, _| {
            Ok(ChainValue::Bytes(pages.request.body()))
        });
        table.action("cookie", "cookie").sync_handler(|pages, _| {
            pages.request.set_status_code(201);
            pages
                .request
                .set_response_header("X-Served-By", "pages");
            Ok(pages.request.cookie("session").unwrap_or_default().into())
        });
        table
            .action("hook", "hook")
            .inject::<Probe>()
            .sync_handler(|pages, args| {
                let probe = args.service::<Probe>(0)?;
                pages
                    .request
                    .on_destroy(move || probe.0.store(true, Ordering::SeqCst));
                Ok("hooked".into())
            });
        table.action("missing", "missing").sync_handler(|_, _| {
            Err(Error::routing(418, "teapot", serde_json::json!({})))
        });
    }
}

struct App;

impl Module for App {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::root().controller::<Pages>().router(
            Router::new()
                .rule(RouteRule::new(&[HttpMethod::GET], "/pages/:id", "pages/show"))
                .rule(RouteRule::new(&[HttpMethod::POST], "/echo", "pages/echo"))
                .rule(RouteRule::new(&[HttpMethod::GET], "/cookie", "pages/cookie"))
                .rule(RouteRule::new(&[HttpMethod::GET], "/missing", "pages/missing"))
                .rule(RouteRule::new(&[HttpMethod::GET], "/hook", "pages/hook"))
                .rule(RouteRule::new(&[HttpMethod::GET], "/orphan", "nowhere/pages/show"))
                .rule(RouteRule::new(&[HttpMethod::GET], "/nocontroller", "ghost/show")),
        )
    }
}

struct NotRoot;

impl Module for NotRoot {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new("feature")
    }
}

async fn dispatch(injector: &ModuleInjector, request: IncomingRequest) -> ServerResponse {
    let mut response = ServerResponse::new();
    fire_request(injector, request, &mut response).await;
    response
}

#[tokio::test]
async fn test_path_params_win_over_query() {
    let injector = ModuleInjector::create::<App>().unwrap();
    let response = dispatch(&injector, IncomingRequest::new("GET", "/pages/7?id=9&lang=en")).await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.body(), "7:en:each");
    assert!(response.is_finished());
}

#[tokio::test]
async fn test_disabled_stage_is_skipped() {
    let injector = ModuleInjector::create::<App>()
        .unwrap()
        .with_stages(&[Stage::Action]);
    let response = dispatch(&injector, IncomingRequest::new("GET", "/pages/1")).await;

    assert_eq!(response.body(), "1:-:null");
}

#[tokio::test]
async fn test_post_body_is_collected() {
    let injector = ModuleInjector::create::<App>().unwrap();
    let request = IncomingRequest::new("POST", "/echo").with_body(RequestBody::from_chunks(["a", "b", "c"]));
    let response = dispatch(&injector, request).await;

    assert_eq!(response.body(), "abc");
}

#[tokio::test]
async fn test_response_headers_and_status() {
    let injector = ModuleInjector::create::<App>().unwrap();
    let request = IncomingRequest::new("GET", "/cookie").with_header("Cookie", "session=s1");
    let response = dispatch(&injector, request).await;

    assert_eq!(response.status(), 201);
    assert_eq!(response.body(), "s1");
    assert_eq!(response.header("x-served-by"), Some(&HeaderValue::from("pages")));
    assert_eq!(response.header("content-type"), Some(&HeaderValue::from("text/html")));
}

#[tokio::test]
async fn test_handler_error_status_is_rendered() {
    let injector = ModuleInjector::create::<App>().unwrap();
    let response = dispatch(&injector, IncomingRequest::new("GET", "/missing")).await;

    assert_eq!(response.status(), 418);
    assert_eq!(response.body(), "Error: teapot");
}

#[tokio::test]
async fn test_unknown_module() {
    let injector = ModuleInjector::create::<App>().unwrap();
    let response = dispatch(&injector, IncomingRequest::new("GET", "/orphan")).await;

    assert_eq!(response.status(), 500);
    assert_eq!(
        response.body(),
        "Error: Module with route nowhere/pages/show is not registered in system, please check your route configuration!"
    );
}

#[tokio::test]
async fn test_unknown_controller() {
    let injector = ModuleInjector::create::<App>().unwrap();
    let response = dispatch(&injector, IncomingRequest::new("GET", "/nocontroller")).await;

    assert_eq!(response.status(), 400);
    assert_eq!(
        response.body(),
        "Error: You must define controller within current route: ghost/show"
    );
}

#[tokio::test]
async fn test_unsupported_method() {
    let injector = ModuleInjector::create::<App>().unwrap();
    let response = dispatch(&injector, IncomingRequest::new("BREW", "/pages/1")).await;

    assert_eq!(response.status(), 405);
}

#[tokio::test]
async fn test_missing_root_module() {
    let injector = ModuleInjector::create::<NotRoot>().unwrap();
    let response = dispatch(&injector, IncomingRequest::new("GET", "/")).await;

    assert_eq!(response.status(), 500);
    assert_eq!(response.body(), "Error: Root module is not defined");
}

#[tokio::test]
async fn test_destroy_hooks_run_when_response_ends() {
    let injector = ModuleInjector::create::<App>().unwrap();
    let destroyed = Arc::new(AtomicBool::new(false));

    let request = IncomingRequest::new("GET", "/hook")
        .with_provider(Provider::value(Probe(destroyed.clone())));
    let response = dispatch(&injector, request).await;

    assert_eq!(response.status(), 200);
    assert!(destroyed.load(Ordering::SeqCst));
    assert!(injector.root().is_some_and(|root| !root.scope.is_destroyed()));
}

#[tokio::test]
async fn test_body_read_failure_is_rendered() {
    let injector = ModuleInjector::create::<App>().unwrap();
    let (sender, body) = RequestBody::channel();
    sender.send("partial").unwrap();
    sender.fail(Error::Transport("connection reset by peer".to_string()));

    let response = dispatch(&injector, IncomingRequest::new("POST", "/echo").with_body(body)).await;

    assert_eq!(response.status(), 500);
    assert_eq!(response.body(), "Error: connection reset by peer");
    assert!(response.is_finished());
}
