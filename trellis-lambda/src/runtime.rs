//! Lambda runtime for Trellis applications.

use bytes::Bytes;
use lambda_runtime::{run, service_fn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use trellis_core::{
    IncomingRequest, Module, ModuleInjector, Provider, RequestBody, ServerResponse, Stage,
    fire_request,
};

use crate::event::{
    Forwarder, InterceptedEvent, LambdaContext, LambdaEvent, is_gateway_proxy_auth_event,
    is_gateway_proxy_event, is_routing_event, query_string,
};
use crate::response::{ProxyResponse, body_text};
use crate::{LambdaError, Result};

/// Rewrites the route of an invocation before dispatch.
pub type LambdaInterceptor = Arc<dyn Fn(&InterceptedEvent<'_>, &mut Forwarder) + Send + Sync>;

/// Lambda server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LambdaServerConfig {
    /// Route used for events that carry none.
    pub path: Option<String>,
    /// Method paired with `path`.
    pub http_method: Option<String>,
    /// Optional stages every controller run executes.
    #[serde(alias = "actions")]
    pub stages: Vec<Stage>,
}

impl Default for LambdaServerConfig {
    fn default() -> Self {
        Self {
            path: None,
            http_method: None,
            stages: Stage::ALL.to_vec(),
        }
    }
}

impl LambdaServerConfig {
    /// Route events without routing information to `method path`.
    pub fn route(mut self, path: impl Into<String>, http_method: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self.http_method = Some(http_method.into());
        self
    }

    pub fn stages(mut self, stages: impl Into<Vec<Stage>>) -> Self {
        self.stages = stages.into();
        self
    }

    fn target(&self) -> Option<(String, String)> {
        Some((self.path.clone()?, self.http_method.clone()?))
    }
}

/// Dispatches Lambda invocations into a root module.
pub struct LambdaServer {
    injector: Arc<ModuleInjector>,
    config: LambdaServerConfig,
    interceptor: Option<LambdaInterceptor>,
}

impl LambdaServer {
    /// Resolve the module graph of `M`, which must be the root module.
    pub fn new<M: Module>(config: LambdaServerConfig) -> Result<Self> {
        let injector = ModuleInjector::create_root::<M>("Lambda server")?.with_stages(&config.stages);
        info!("Lambda server started");

        Ok(Self {
            injector: Arc::new(injector),
            config,
            interceptor: None,
        })
    }

    pub fn with_interceptor<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(&InterceptedEvent<'_>, &mut Forwarder) + Send + Sync + 'static,
    {
        self.interceptor = Some(Arc::new(interceptor));
        self
    }

    pub fn injector(&self) -> &Arc<ModuleInjector> {
        &self.injector
    }

    /// Handle one invocation. Proxy events get a proxy response object,
    /// every other event gets the rendered body as a string.
    pub async fn handle(&self, event: Value, context: LambdaContext) -> Result<Value> {
        debug!(request_id = %context.request_id, event = %event, "Lambda event");

        let proxy = is_gateway_proxy_event(&event);
        let (url, method) = self.target(&event, &context, proxy);

        let mut request = IncomingRequest::new(method, url)
            .serverless(true)
            .with_provider(Provider::value(LambdaEvent(event.clone())))
            .with_provider(Provider::value(context.clone()));

        if proxy {
            if let Some(headers) = event.get("headers").and_then(Value::as_object) {
                for (name, value) in headers {
                    if let Some(value) = value.as_str() {
                        request = request.with_header(name, value);
                    }
                }
            }
            if let Some(body) = event.get("body").and_then(Value::as_str).filter(|b| !b.is_empty()) {
                request = request.with_body(RequestBody::from_chunks([Bytes::from(body.to_owned())]));
            }
        }

        let mut response = ServerResponse::new();
        let body = fire_request(&self.injector, request, &mut response).await;
        debug!(request_id = %context.request_id, status = response.status(), "Lambda response");

        if proxy {
            let is_base64_encoded = event
                .get("isBase64Encoded")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let proxy_response = ProxyResponse::from_response(&response, &body, is_base64_encoded);
            serde_json::to_value(proxy_response).map_err(|e| LambdaError::Response(e.to_string()))
        } else {
            Ok(Value::String(body_text(&body)))
        }
    }

    /// Pick the url and method to dispatch. The interceptor sees every
    /// event, but a proxy event's own path and method win over its forward.
    /// Otherwise the forward, the event's routing fields and the configured
    /// route are tried in that order; `GET /` is the last resort.
    fn target(&self, event: &Value, context: &LambdaContext, proxy: bool) -> (String, String) {
        let mut forwarder = Forwarder::default();
        if let Some(interceptor) = &self.interceptor {
            let intercepted = InterceptedEvent {
                event,
                context,
                is_gateway_proxy_event: proxy,
                is_gateway_proxy_auth_event: is_gateway_proxy_auth_event(event),
            };
            interceptor(&intercepted, &mut forwarder);
        }

        if proxy {
            let path = event["path"].as_str().unwrap_or("/");
            let url = match query_string(event) {
                Some(query) => format!("{}?{}", path, query),
                None => path.to_string(),
            };
            let method = event["httpMethod"].as_str().unwrap_or("GET").to_string();
            return (url, method);
        }

        if let Some(target) = forwarder.into_target() {
            return target;
        }

        if is_routing_event(event) {
            let path = event["path"].as_str().unwrap_or("/").to_string();
            let method = event["httpMethod"].as_str().unwrap_or("GET").to_string();
            return (path, method);
        }

        if let Some(target) = self.config.target() {
            return target;
        }

        warn!(
            request_id = %context.request_id,
            "No routing provided, forwarding to the default route. Use an interceptor or set the route in LambdaServerConfig"
        );
        ("/".to_string(), "GET".to_string())
    }

    /// Run the Lambda runtime loop.
    ///
    /// This function never returns under normal operation.
    pub async fn run(self) -> std::result::Result<(), lambda_runtime::Error> {
        info!("Starting Trellis Lambda runtime");
        let server = Arc::new(self);

        run(service_fn(move |invocation: lambda_runtime::LambdaEvent<Value>| {
            let server = server.clone();
            async move {
                let context = LambdaContext::from(&invocation.context);
                server
                    .handle(invocation.payload, context)
                    .await
                    .map_err(lambda_runtime::Error::from)
            }
        }))
        .await
    }
}
