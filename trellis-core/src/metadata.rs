// Registration tables describing controllers, their stages and parameters

use crate::executor::ActionArgs;
use crate::filter::FilterDescriptor;
use crate::{ChainValue, Controller, Error, Filter, Provider, Result, Token};
use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

/// Future returned by a stage handler.
pub type ActionFuture<'a> = BoxFuture<'a, Result<ChainValue>>;

/// A stage handler bound to a concrete controller type.
pub type ActionHandler<C> =
    Arc<dyn for<'a> Fn(&'a C, ActionArgs) -> ActionFuture<'a> + Send + Sync>;

type ErasedHandler = Arc<
    dyn Fn(Arc<dyn Any + Send + Sync>, ActionArgs) -> BoxFuture<'static, Result<ChainValue>>
        + Send
        + Sync,
>;

/// The stages a controller run goes through, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    BeforeEach,
    Before,
    Action,
    After,
    AfterEach,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::BeforeEach,
        Stage::Before,
        Stage::Action,
        Stage::After,
        Stage::AfterEach,
    ];

    /// Name used in diagnostics, e.g. `@Action("index")`.
    pub fn decorator(&self) -> &'static str {
        match self {
            Stage::BeforeEach => "BeforeEach",
            Stage::Before => "Before",
            Stage::Action => "Action",
            Stage::After => "After",
            Stage::AfterEach => "AfterEach",
        }
    }

    /// Whether the stage is registered for a specific action name.
    pub fn is_named(&self) -> bool {
        matches!(self, Stage::Before | Stage::Action | Stage::After)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.decorator())
    }
}

/// How one handler parameter is filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterBinding {
    /// A route parameter by name.
    Param(String),
    /// An explicitly requested provider.
    Inject(Token),
    /// The current chain value.
    Chain,
    /// The error being rendered.
    Error,
    /// A parameter without annotation, resolved by its declared type.
    DesignType(Token),
}

/// One stage handler registration, erased over the controller type.
#[derive(Clone)]
pub struct ActionMapping {
    pub stage: Stage,
    /// `None` for `BeforeEach` and `AfterEach`.
    pub action: Option<String>,
    /// Name of the method implementing the stage, for diagnostics.
    pub method: &'static str,
    /// Content type the handler emits before it runs.
    pub produces: Option<String>,
    pub params: Vec<ParameterBinding>,
    declared_by: &'static str,
    handler: ErasedHandler,
}

impl ActionMapping {
    pub fn matches(&self, stage: Stage, action: Option<&str>) -> bool {
        self.stage == stage && self.action.as_deref() == action
    }

    /// The controller type the handler was declared on.
    pub fn declared_by(&self) -> &'static str {
        self.declared_by
    }

    /// Run the handler against an erased controller instance.
    pub fn invoke(
        &self,
        instance: Arc<dyn Any + Send + Sync>,
        args: ActionArgs,
    ) -> BoxFuture<'static, Result<ChainValue>> {
        (self.handler)(instance, args)
    }
}

impl fmt::Debug for ActionMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionMapping")
            .field("stage", &self.stage)
            .field("action", &self.action)
            .field("method", &self.method)
            .field("produces", &self.produces)
            .field("params", &self.params)
            .field("declared_by", &self.declared_by)
            .finish()
    }
}

struct ActionEntry<C> {
    stage: Stage,
    action: Option<String>,
    method: &'static str,
    produces: Option<String>,
    params: Vec<ParameterBinding>,
    declared_by: &'static str,
    handler: ActionHandler<C>,
}

impl<C> ActionEntry<C> {
    fn same_slot(&self, other: &ActionEntry<C>) -> bool {
        self.stage == other.stage && self.action == other.action
    }
}

/// Stage registrations of one controller type.
///
/// At most one handler exists per stage and action name. A registration
/// made on the controller itself always replaces one inherited from a base
/// type, whatever the order of the calls.
pub struct ActionTable<C> {
    entries: Vec<ActionEntry<C>>,
}

impl<C: Send + Sync + 'static> ActionTable<C> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn before_each(&mut self, method: &'static str) -> ActionBuilder<'_, C> {
        self.stage(Stage::BeforeEach, None, method)
    }

    pub fn before(&mut self, action: &str, method: &'static str) -> ActionBuilder<'_, C> {
        self.stage(Stage::Before, Some(action), method)
    }

    pub fn action(&mut self, action: &str, method: &'static str) -> ActionBuilder<'_, C> {
        self.stage(Stage::Action, Some(action), method)
    }

    pub fn after(&mut self, action: &str, method: &'static str) -> ActionBuilder<'_, C> {
        self.stage(Stage::After, Some(action), method)
    }

    pub fn after_each(&mut self, method: &'static str) -> ActionBuilder<'_, C> {
        self.stage(Stage::AfterEach, None, method)
    }

    /// Start a registration for an arbitrary stage.
    pub fn stage(
        &mut self,
        stage: Stage,
        action: Option<&str>,
        method: &'static str,
    ) -> ActionBuilder<'_, C> {
        ActionBuilder {
            table: self,
            stage,
            action: if stage.is_named() {
                action.map(str::to_string)
            } else {
                None
            },
            method,
            produces: None,
            params: Vec::new(),
        }
    }

    /// Inherit the registrations of base type `B`. Slots already registered
    /// on this table are kept.
    pub fn inherit<B>(&mut self)
    where
        B: Controller,
        C: AsRef<B>,
    {
        let mut base = ActionTable::<B>::new();
        B::actions(&mut base);

        for entry in base.entries {
            let inherited = ActionEntry::<C> {
                stage: entry.stage,
                action: entry.action,
                method: entry.method,
                produces: entry.produces,
                params: entry.params,
                declared_by: entry.declared_by,
                handler: lift_handler::<B, C>(entry.handler),
            };
            if !self.entries.iter().any(|own| own.same_slot(&inherited)) {
                self.entries.push(inherited);
            }
        }
    }

    fn register(&mut self, entry: ActionEntry<C>) {
        match self.entries.iter_mut().find(|own| own.same_slot(&entry)) {
            Some(slot) => *slot = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn erase(self) -> Vec<ActionMapping> {
        self.entries
            .into_iter()
            .map(|entry| {
                let handler = entry.handler;
                let erased: ErasedHandler =
                    Arc::new(move |instance: Arc<dyn Any + Send + Sync>, args: ActionArgs| {
                        let handler = handler.clone();
                        async move {
                            let controller = instance.downcast::<C>().map_err(|_| {
                                Error::DependencyInjection(format!(
                                    "controller instance is not a {}",
                                    type_name::<C>()
                                ))
                            })?;
                            handler(&*controller, args).await
                        }
                        .boxed()
                    });
                ActionMapping {
                    stage: entry.stage,
                    action: entry.action,
                    method: entry.method,
                    produces: entry.produces,
                    params: entry.params,
                    declared_by: entry.declared_by,
                    handler: erased,
                }
            })
            .collect()
    }
}

fn lift_handler<B, C>(handler: ActionHandler<B>) -> ActionHandler<C>
where
    B: Send + Sync + 'static,
    C: AsRef<B> + Send + Sync + 'static,
{
    Arc::new(bind_handler::<C, _>(move |controller, args| {
        handler(<C as AsRef<B>>::as_ref(controller), args)
    }))
}

/// Pins a closure to the higher-ranked handler signature.
fn bind_handler<C, F>(handler: F) -> F
where
    F: for<'a> Fn(&'a C, ActionArgs) -> ActionFuture<'a>,
{
    handler
}

/// Builder for a single stage registration.
pub struct ActionBuilder<'t, C> {
    table: &'t mut ActionTable<C>,
    stage: Stage,
    action: Option<String>,
    method: &'static str,
    produces: Option<String>,
    params: Vec<ParameterBinding>,
}

impl<'t, C: Send + Sync + 'static> ActionBuilder<'t, C> {
    /// Content type set on the response before the handler runs.
    pub fn produces(mut self, content_type: impl Into<String>) -> Self {
        self.produces = Some(content_type.into());
        self
    }

    /// Bind the next parameter to a route parameter.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParameterBinding::Param(name.into()));
        self
    }

    /// Bind the next parameter to the provider registered for `T`.
    pub fn inject<T: 'static>(mut self) -> Self {
        self.params.push(ParameterBinding::Inject(Token::of::<T>()));
        self
    }

    /// Bind the next parameter to a provider registered under a token.
    pub fn inject_token(mut self, token: impl Into<Token>) -> Self {
        self.params.push(ParameterBinding::Inject(token.into()));
        self
    }

    /// Bind the next parameter to the current chain value.
    pub fn chain(mut self) -> Self {
        self.params.push(ParameterBinding::Chain);
        self
    }

    /// Bind the next parameter to the error being rendered.
    pub fn error(mut self) -> Self {
        self.params.push(ParameterBinding::Error);
        self
    }

    /// Bind the next parameter by its declared type.
    pub fn typed<T: 'static>(mut self) -> Self {
        self.params.push(ParameterBinding::DesignType(Token::of::<T>()));
        self
    }

    /// Finish the registration with an async handler.
    pub fn handler<F>(self, handler: F)
    where
        F: for<'a> Fn(&'a C, ActionArgs) -> ActionFuture<'a> + Send + Sync + 'static,
    {
        let ActionBuilder {
            table,
            stage,
            action,
            method,
            produces,
            params,
        } = self;
        table.register(ActionEntry {
            stage,
            action,
            method,
            produces,
            params,
            declared_by: type_name::<C>(),
            handler: Arc::new(handler),
        });
    }

    /// Finish the registration with a handler that completes immediately.
    pub fn sync_handler<F>(self, handler: F)
    where
        F: Fn(&C, ActionArgs) -> Result<ChainValue> + Send + Sync + 'static,
    {
        self.handler(move |controller, args| future::ready(handler(controller, args)).boxed());
    }
}

/// Declaration data of a controller.
#[derive(Clone, Default)]
pub struct ControllerMetadata {
    /// Controller name, the middle segment of a route.
    pub name: String,
    pub filters: Vec<FilterDescriptor>,
    pub providers: Vec<Provider>,
}

impl ControllerMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filters: Vec::new(),
            providers: Vec::new(),
        }
    }

    pub fn filter<F: Filter>(mut self) -> Self {
        self.filters.push(FilterDescriptor::of::<F>());
        self
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }
}

/// Everything the engine knows about a controller type, erased.
#[derive(Clone)]
pub struct ControllerDescriptor {
    pub name: String,
    pub type_name: &'static str,
    pub type_id: TypeId,
    pub filters: Vec<FilterDescriptor>,
    pub providers: Vec<Provider>,
    actions: Arc<[ActionMapping]>,
    provider: Provider,
}

impl ControllerDescriptor {
    pub fn of<C: Controller>() -> Self {
        let metadata = C::metadata();
        let mut table = ActionTable::<C>::new();
        C::actions(&mut table);

        Self {
            name: metadata.name,
            type_name: type_name::<C>(),
            type_id: TypeId::of::<C>(),
            filters: metadata.filters,
            providers: metadata.providers,
            actions: table.erase().into(),
            provider: Provider::factory(C::create),
        }
    }

    pub fn actions(&self) -> &[ActionMapping] {
        &self.actions
    }

    /// Provider that builds the controller instance inside a request scope.
    pub fn provider(&self) -> Provider {
        self.provider.clone()
    }

    pub fn token(&self) -> Token {
        Token::Type {
            id: self.type_id,
            name: self.type_name,
        }
    }

    /// The type name without its module path.
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.type_name)
    }
}

impl fmt::Debug for ControllerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerDescriptor")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("filters", &self.filters.len())
            .field("actions", &self.actions)
            .finish()
    }
}

pub(crate) fn short_type_name(name: &'static str) -> &'static str {
    let base = name.split('<').next().unwrap_or(name);
    base.rsplit("::").next().unwrap_or(base)
}
