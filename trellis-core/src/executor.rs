// Invocation of a single stage handler

use crate::logging::trace;
use crate::{
    ActionMapping, ChainState, ChainValue, ControllerDescriptor, Error, ParameterBinding,
    RequestContext, Result, Scope,
};
use futures_util::future::BoxFuture;
use std::any::{Any, type_name};
use std::sync::Arc;

/// A resolved handler argument.
#[derive(Clone)]
pub enum Argument {
    /// Route parameter; `None` when the route did not carry it.
    Param(Option<String>),
    Service(Arc<dyn Any + Send + Sync>),
    Chain(ChainValue),
    Error(Error),
}

impl std::fmt::Debug for Argument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Argument::Param(value) => f.debug_tuple("Param").field(value).finish(),
            Argument::Service(_) => f.write_str("Service(..)"),
            Argument::Chain(value) => f.debug_tuple("Chain").field(value).finish(),
            Argument::Error(error) => f.debug_tuple("Error").field(error).finish(),
        }
    }
}

/// Arguments handed to a stage handler, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ActionArgs {
    args: Vec<Argument>,
}

impl ActionArgs {
    pub fn new(args: Vec<Argument>) -> Self {
        Self { args }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Argument> {
        self.args.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.args.iter()
    }

    /// The route parameter bound at `index`.
    pub fn param(&self, index: usize) -> Result<Option<&str>> {
        match self.args.get(index) {
            Some(Argument::Param(value)) => Ok(value.as_deref()),
            other => Err(mismatch(index, "route parameter", other)),
        }
    }

    /// The chain value bound at `index`.
    pub fn chain(&self, index: usize) -> Result<&ChainValue> {
        match self.args.get(index) {
            Some(Argument::Chain(value)) => Ok(value),
            other => Err(mismatch(index, "chain value", other)),
        }
    }

    /// The error bound at `index`.
    pub fn error(&self, index: usize) -> Result<&Error> {
        match self.args.get(index) {
            Some(Argument::Error(error)) => Ok(error),
            other => Err(mismatch(index, "error", other)),
        }
    }

    /// The provider bound at `index`, downcast to `T`.
    pub fn service<T: Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>> {
        match self.args.get(index) {
            Some(Argument::Service(instance)) => instance.clone().downcast::<T>().map_err(|_| {
                Error::Internal(format!("argument {} is not a {}", index, type_name::<T>()))
            }),
            other => Err(mismatch(index, type_name::<T>(), other)),
        }
    }
}

fn mismatch(index: usize, expected: &str, found: Option<&Argument>) -> Error {
    match found {
        Some(found) => Error::Internal(format!(
            "argument {} is not a {}: found {:?}",
            index, expected, found
        )),
        None => Error::Internal(format!("argument {} is missing, expected a {}", index, expected)),
    }
}

/// Resolve one parameter binding against the controller scope and the state
/// of the current run.
pub fn resolve_argument(
    binding: &ParameterBinding,
    scope: &Scope,
    state: &ChainState,
    chain: &ChainValue,
) -> Result<Argument> {
    match binding {
        ParameterBinding::Param(name) => Ok(Argument::Param(state.route().params.get(name).cloned())),
        ParameterBinding::Chain => Ok(Argument::Chain(chain.clone())),
        ParameterBinding::Error => Ok(Argument::Error(state.error().clone())),
        ParameterBinding::Inject(token) | ParameterBinding::DesignType(token) => {
            Ok(Argument::Service(scope.get_token(token)?))
        }
    }
}

/// Invoke one stage handler.
///
/// The controller instance is taken from `scope`. A declared content type is
/// applied before the handler runs and arguments are resolved in declaration
/// order. Resolution errors surface here; the returned future carries the
/// handler's own outcome.
pub fn process_action(
    scope: &Scope,
    controller: &ControllerDescriptor,
    mapping: &ActionMapping,
    state: &ChainState,
    context: &RequestContext,
    chain: &ChainValue,
) -> Result<BoxFuture<'static, Result<ChainValue>>> {
    let instance = scope.get_token(&controller.token())?;

    if let Some(content_type) = &mapping.produces {
        context.set_content_type(content_type.clone());
    }

    let args = mapping
        .params
        .iter()
        .map(|binding| resolve_argument(binding, scope, state, chain))
        .collect::<Result<Vec<_>>>()?;

    trace!(
        controller = controller.type_name,
        method = mapping.method,
        stage = mapping.stage.decorator(),
        args = args.len(),
        "Invoking stage handler"
    );

    Ok(mapping.invoke(instance, ActionArgs::new(args)))
}
