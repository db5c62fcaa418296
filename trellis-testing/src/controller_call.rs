// Direct controller invocation

use std::collections::HashMap;
use std::sync::Arc;
use trellis_core::{
    ChainState, ChainValue, Controller, ControllerDescriptor, ControllerResolver, Error,
    HttpMethod, IncomingRequest, RequestContext, ResolvedRoute, Result, Scope,
};

/// Run `action` of controller `C` under `scope` as a `GET /` request and
/// return the final chain value.
///
/// Filters and all five stages run as they would for a routed request;
/// the controller scope is destroyed once the run completes.
pub async fn fake_controller_action_call<C: Controller>(
    scope: &Scope,
    action: &str,
    params: HashMap<String, String>,
    headers: HashMap<String, String>,
) -> Result<ChainValue> {
    let request = headers
        .into_iter()
        .fold(IncomingRequest::new("GET", "/"), |request, (name, value)| {
            request.with_header(name, value)
        });
    let context = Arc::new(RequestContext::new(&request));

    let descriptor = ControllerDescriptor::of::<C>();
    let route = ResolvedRoute::new(
        HttpMethod::GET,
        format!("{}/{}", descriptor.name, action),
        params,
    );
    let state = ChainState::new(route, action, Error::empty());

    let result = ControllerResolver::new(context.clone(), state)
        .process_controller(scope, &descriptor)
        .await;
    context.teardown();
    result
}
