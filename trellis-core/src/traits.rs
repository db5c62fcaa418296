// Core traits for the Trellis engine

use crate::{ActionTable, ControllerMetadata, ModuleMetadata, Result, Scope};

/// A controller: a type built per request whose stage handlers serve the
/// actions of one route segment.
///
/// ```ignore
/// struct HomeController { request: Arc<Request> }
///
/// impl Controller for HomeController {
///     fn metadata() -> ControllerMetadata {
///         ControllerMetadata::new("home").filter::<AuthFilter>()
///     }
///
///     fn create(scope: &Scope) -> Result<Self> {
///         Ok(Self { request: scope.get::<Request>()? })
///     }
///
///     fn actions(table: &mut ActionTable<Self>) {
///         table.action("index", "index").sync_handler(|_, _| Ok("Hello".into()));
///     }
/// }
/// ```
pub trait Controller: Send + Sync + Sized + 'static {
    /// Name, filters and extra providers of the controller.
    fn metadata() -> ControllerMetadata;

    /// Build the instance from the request scope.
    fn create(scope: &Scope) -> Result<Self>;

    /// Register stage handlers.
    fn actions(table: &mut ActionTable<Self>);
}

/// A module groups controllers and providers under a route prefix.
pub trait Module: Send + Sync + 'static {
    fn metadata() -> ModuleMetadata;
}
