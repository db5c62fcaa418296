//! Lambda event inspection and route forwarding.

use serde_json::Value;

/// The raw invocation event, injectable into controllers.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaEvent(pub Value);

impl LambdaEvent {
    pub fn payload(&self) -> &Value {
        &self.0
    }
}

/// Invocation context, injectable into controllers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LambdaContext {
    pub request_id: String,
    /// Execution deadline in milliseconds since the epoch.
    pub deadline_ms: u64,
    pub invoked_function_arn: String,
}

impl From<&lambda_runtime::Context> for LambdaContext {
    fn from(context: &lambda_runtime::Context) -> Self {
        Self {
            request_id: context.request_id.clone(),
            deadline_ms: context.deadline,
            invoked_function_arn: context.invoked_function_arn.clone(),
        }
    }
}

fn is_str(value: &Value, key: &str) -> bool {
    value.get(key).is_some_and(Value::is_string)
}

/// An event carrying `path` and `httpMethod`.
pub fn is_routing_event(event: &Value) -> bool {
    is_str(event, "path") && is_str(event, "httpMethod")
}

/// An API Gateway proxy event: a routing event whose `requestContext`
/// names the resource, request and API.
pub fn is_gateway_proxy_event(event: &Value) -> bool {
    is_routing_event(event)
        && event.get("requestContext").is_some_and(|ctx| {
            is_str(ctx, "resourceId") && is_str(ctx, "requestId") && is_str(ctx, "apiId")
        })
}

/// An API Gateway authorizer event.
pub fn is_gateway_proxy_auth_event(event: &Value) -> bool {
    is_str(event, "type") && is_str(event, "methodArn")
}

/// Rebuild the query string of a proxy event, preferring the multi-valued
/// parameters. Returns `None` when the event has none.
pub fn query_string(event: &Value) -> Option<String> {
    if let Some(params) = event
        .get("multiValueQueryStringParameters")
        .and_then(Value::as_object)
    {
        let pairs: Vec<String> = params
            .iter()
            .flat_map(|(key, values)| {
                values
                    .as_array()
                    .into_iter()
                    .flatten()
                    .map(move |value| format!("{}={}", key, scalar_text(value)))
            })
            .collect();
        return Some(pairs.join("&"));
    }

    event
        .get("queryStringParameters")
        .and_then(Value::as_object)
        .map(|params| {
            params
                .iter()
                .map(|(key, value)| format!("{}={}", key, scalar_text(value)))
                .collect::<Vec<_>>()
                .join("&")
        })
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// What an interceptor sees of an invocation.
#[derive(Debug, Clone, Copy)]
pub struct InterceptedEvent<'a> {
    pub event: &'a Value,
    pub context: &'a LambdaContext,
    pub is_gateway_proxy_event: bool,
    pub is_gateway_proxy_auth_event: bool,
}

/// Collects the route an interceptor forwards the invocation to.
#[derive(Debug, Default)]
pub struct Forwarder {
    target: Option<(String, String)>,
}

impl Forwarder {
    /// Dispatch the invocation as `method url`.
    pub fn forward(&mut self, url: impl Into<String>, method: impl Into<String>) {
        let url = url.into();
        let method = method.into();
        tracing::debug!(%url, %method, "Forwarding");
        self.target = Some((url, method));
    }

    pub fn target(&self) -> Option<(&str, &str)> {
        self.target
            .as_ref()
            .map(|(url, method)| (url.as_str(), method.as_str()))
    }

    pub(crate) fn into_target(self) -> Option<(String, String)> {
        self.target
    }
}
