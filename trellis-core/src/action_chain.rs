// Lookup of stage handlers on a controller

use crate::{ActionMapping, ControllerDescriptor, Error, ParameterBinding, ResolvedRoute, Result, Stage};
use serde_json::json;

/// Whether `controller` registered a handler for `stage`. Named stages match
/// on `action`; `BeforeEach` and `AfterEach` ignore it.
pub fn has_mapped_action(controller: &ControllerDescriptor, action: &str, stage: Stage) -> bool {
    find(controller, action, stage).is_some()
}

/// The handler registered for `stage`, or a 400 naming the missing stage and
/// the controller.
pub fn get_mapped_action<'c>(
    controller: &'c ControllerDescriptor,
    action: &str,
    stage: Stage,
    route: &ResolvedRoute,
) -> Result<&'c ActionMapping> {
    find(controller, action, stage).ok_or_else(|| {
        let named = stage.is_named().then_some(action);
        Error::routing(
            400,
            format!(
                "@{}(\"{}\") is not defined on controller {}",
                stage.decorator(),
                named.unwrap_or("null"),
                controller.short_name()
            ),
            json!({
                "actionName": named,
                "name": stage.decorator(),
                "resolvedRoute": route,
            }),
        )
    })
}

/// Parameter bindings of `mapping`, ordered by parameter position.
pub fn get_mapped_action_arguments(mapping: &ActionMapping) -> &[ParameterBinding] {
    &mapping.params
}

fn find<'c>(controller: &'c ControllerDescriptor, action: &str, stage: Stage) -> Option<&'c ActionMapping> {
    let action = stage.is_named().then_some(action);
    controller
        .actions()
        .iter()
        .find(|mapping| mapping.matches(stage, action))
}
