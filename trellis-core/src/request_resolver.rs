// Per-request dispatch: routing, body collection, module resolution and rendering

use crate::logging::{debug, error, warn};
use crate::routing::{parse_query_string, split_url};
use crate::{
    ChainState, ChainValue, ControllerDescriptor, ControllerResolver, Error, HeaderValue,
    HttpMethod, IncomingRequest, ModuleEntry, ModuleInjector, Provider, Redirect, RequestBody,
    RequestContext, ResolvedRoute, Result, ServerResponse, ROOT_MODULE,
};
use bytes::Bytes;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Dispatch one request and render the outcome into `response`.
///
/// Every failure is rendered: a custom error route is tried first, then the
/// error's text is written with its status code. The rendered payload is
/// returned as well.
pub async fn fire_request(
    injector: &ModuleInjector,
    request: IncomingRequest,
    response: &mut ServerResponse,
) -> Bytes {
    let start = Instant::now();
    let context = Arc::new(RequestContext::new(&request));
    let teardown = context.clone();
    response.on_finish(move || teardown.teardown());

    let IncomingRequest {
        body, providers, ..
    } = request;
    let mut resolver = RequestResolver::new(injector, context.clone(), providers);

    let payload = if injector.root().is_none() {
        let err = Error::routing(500, "Root module is not defined", Value::Object(Default::default()));
        resolver.render_default_error(response, err)
    } else {
        resolver.process(body, response).await
    };

    debug!(
        request_id = %context.id(),
        method = %context.method(),
        url = %context.url(),
        status = response.status(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Request processed"
    );
    payload
}

/// The module, controller and action a route resolved to.
#[derive(Debug, Clone)]
pub struct ResolvedModule<'a> {
    pub module: &'a ModuleEntry,
    pub controller: String,
    pub action: String,
    pub route: ResolvedRoute,
}

/// Drives one request from parsing to rendering.
pub struct RequestResolver<'a> {
    injector: &'a ModuleInjector,
    context: Arc<RequestContext>,
    providers: Vec<Provider>,
    route: Option<ResolvedRoute>,
    module_name: Option<String>,
}

impl<'a> RequestResolver<'a> {
    pub fn new(
        injector: &'a ModuleInjector,
        context: Arc<RequestContext>,
        providers: Vec<Provider>,
    ) -> Self {
        Self {
            injector,
            context,
            providers,
            route: None,
            module_name: None,
        }
    }

    /// Execute the request and render its result, falling back to the custom
    /// error route and then to the default error rendering.
    pub async fn process(&mut self, body: RequestBody, response: &mut ServerResponse) -> Bytes {
        let rendered = match self.execute(body).await {
            Ok(chain) => match self.context.redirect() {
                Some(redirect) => Ok(self.render_redirect(response, redirect)),
                None => self.render_data(response, chain),
            },
            Err(err) => Err(err),
        };

        match rendered {
            Ok(payload) => payload,
            Err(err) => match self.render_custom_error(response, err).await {
                Ok(payload) => payload,
                Err(err) => self.render_default_error(response, err),
            },
        }
    }

    async fn execute(&mut self, body: RequestBody) -> Result<ChainValue> {
        let method = HttpMethod::from_str(self.context.method()).ok_or_else(|| {
            Error::routing(
                405,
                format!("Method {} is not supported", self.context.method()),
                json!({ "method": self.context.method() }),
            )
        })?;

        let (path, query) = split_url(self.context.url());
        let mut route = self
            .injector
            .router()
            .parse_request(path, method, self.context.headers())
            .await?;
        debug!(request_id = %self.context.id(), route = %route.route, "Route resolved");

        if let Some(query) = query {
            for (key, value) in parse_query_string(query) {
                route.params.entry(key).or_insert(value);
            }
        }
        self.route = Some(route.clone());

        if route.method.has_body() {
            let chunks = body.collect().await?;
            self.context.set_body(chunks);
        }

        let resolved = self.get_resolved_module(route)?;
        self.module_name = Some(resolved.module.metadata.name.clone());
        self.process_module(&resolved, None).await
    }

    /// Split an internal route into module, controller and action and find
    /// the module serving it.
    pub fn get_resolved_module(&self, route: ResolvedRoute) -> Result<ResolvedModule<'a>> {
        let parts: Vec<&str> = route.route.split('/').collect();
        let (module_name, controller, action) = match parts.as_slice() {
            [controller, action] => (ROOT_MODULE, *controller, *action),
            [module, controller, action, ..] => (*module, *controller, *action),
            _ => ("", "", ""),
        };

        let module = self
            .injector
            .get_module(module_name)
            .filter(|_| !module_name.is_empty())
            .ok_or_else(|| {
                Error::routing(
                    500,
                    format!(
                        "Module with route {} is not registered in system, please check your route configuration!",
                        route.route
                    ),
                    json!({ "route": route }),
                )
            })?;

        Ok(ResolvedModule {
            module,
            controller: controller.to_string(),
            action: action.to_string(),
            route,
        })
    }

    fn get_controller(resolved: &ResolvedModule<'a>) -> Result<&'a ControllerDescriptor> {
        resolved
            .module
            .metadata
            .get_controller(&resolved.controller)
            .ok_or_else(|| {
                Error::routing(
                    400,
                    format!(
                        "You must define controller within current route: {}",
                        resolved.route.route
                    ),
                    json!({ "route": resolved.route }),
                )
            })
    }

    /// Run the controller named by `resolved` with a fresh chain state.
    pub async fn process_module(
        &self,
        resolved: &ResolvedModule<'a>,
        error: Option<Error>,
    ) -> Result<ChainValue> {
        let controller = Self::get_controller(resolved)?;
        let state = ChainState::new(
            resolved.route.clone(),
            resolved.action.clone(),
            error.unwrap_or_else(Error::empty),
        );

        ControllerResolver::new(self.context.clone(), state)
            .with_stages(self.injector.stages())
            .with_providers(self.providers.clone())
            .process_controller(&resolved.module.scope, controller)
            .await
    }

    fn head(&self, content_type: Option<String>) -> Vec<(String, HeaderValue)> {
        let mut headers = self.context.response_headers();
        if let Some(content_type) = content_type {
            headers.push(("Content-Type".to_string(), HeaderValue::Single(content_type)));
        }
        headers
    }

    fn render_data(&self, response: &mut ServerResponse, chain: ChainValue) -> Result<Bytes> {
        let content_type = self.context.content_type();
        let payload = chain
            .into_payload(&content_type, self.context.is_serverless())
            .inspect_err(|err| {
                error!(request_id = %self.context.id(), error = %err, "Invalid response type");
            })?;

        response.write_head(self.context.status(), self.head(Some(content_type)));
        response.write(&payload);
        response.end();
        Ok(payload)
    }

    fn render_redirect(&self, response: &mut ServerResponse, redirect: Redirect) -> Bytes {
        debug!(request_id = %self.context.id(), location = %redirect.url, code = redirect.code, "Redirect");
        let mut headers = self.head(None);
        headers.push(("Location".to_string(), HeaderValue::Single(redirect.url)));
        response.write_head(redirect.code, headers);
        response.end();
        Bytes::new()
    }

    /// Normalize, log and attach the route to an error, and take its status.
    fn process_error(&self, err: Error) -> Error {
        let mut err = err.normalize();
        if let Some(route) = &self.route {
            err = err.with_context_entry("route", json!(route));
        }
        error!(
            request_id = %self.context.id(),
            method = %self.context.method(),
            url = %self.context.url(),
            status = err.status_code(),
            error = %err.message(),
            "Request failed"
        );
        self.context.set_status(err.status_code());
        err
    }

    async fn render_custom_error(&self, response: &mut ServerResponse, err: Error) -> Result<Bytes> {
        let err = self.process_error(err);
        let router = self.injector.router();
        let module_name = self.module_name.as_deref();

        let Some(error_route) = router
            .get_error_route(module_name)
            .filter(|_| router.has_error_route(module_name))
        else {
            return Ok(self.write_error(response, &err));
        };

        let resolved = self.get_resolved_module(ResolvedRoute::new(
            HttpMethod::GET,
            error_route,
            HashMap::new(),
        ))?;
        let chain = self.process_module(&resolved, Some(err)).await?;
        if let Some(redirect) = self.context.redirect() {
            warn!(request_id = %self.context.id(), location = %redirect.url, "Redirect ignored while rendering an error");
        }

        let content_type = self.context.content_type();
        let payload = chain.into_payload(&content_type, self.context.is_serverless())?;
        response.write_head(self.context.status(), self.head(Some(content_type)));
        response.write(&payload);
        response.end();
        Ok(payload)
    }

    fn render_default_error(&self, response: &mut ServerResponse, err: Error) -> Bytes {
        let err = self.process_error(err);
        self.write_error(response, &err)
    }

    fn write_error(&self, response: &mut ServerResponse, err: &Error) -> Bytes {
        let payload = Bytes::from(err.to_string());
        let content_type = self.context.content_type();
        response.write_head(err.status_code(), self.head(Some(content_type)));
        response.write(&payload);
        response.end();
        payload
    }
}
