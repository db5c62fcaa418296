// Module graph and its injector tree

use crate::logging::{debug, info};
use crate::{
    Controller, ControllerDescriptor, Error, Module, Provider, Result, RouteResolver, Router, Scope,
    Stage,
};
use serde_json::json;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Name reserved for the root module. Routes with two segments resolve
/// against it.
pub const ROOT_MODULE: &str = "root";

/// Declaration data of a module.
#[derive(Clone)]
pub struct ModuleMetadata {
    pub name: String,
    pub controllers: Vec<ControllerDescriptor>,
    pub providers: Vec<Provider>,
    /// Root only: providers created once in the root scope and visible to
    /// every module.
    pub shared_providers: Vec<Provider>,
    pub imports: Vec<ModuleMetadata>,
    /// Root only: the router serving the application.
    pub router: Option<Arc<dyn RouteResolver>>,
}

impl ModuleMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            controllers: Vec::new(),
            providers: Vec::new(),
            shared_providers: Vec::new(),
            imports: Vec::new(),
            router: None,
        }
    }

    /// Metadata of the root module.
    pub fn root() -> Self {
        Self::new(ROOT_MODULE)
    }

    pub fn is_root(&self) -> bool {
        self.name == ROOT_MODULE
    }

    pub fn controller<C: Controller>(mut self) -> Self {
        self.controllers.push(ControllerDescriptor::of::<C>());
        self
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn shared_provider(mut self, provider: Provider) -> Self {
        self.shared_providers.push(provider);
        self
    }

    pub fn import<M: Module>(mut self) -> Self {
        self.imports.push(M::metadata());
        self
    }

    pub fn router(mut self, router: impl RouteResolver + 'static) -> Self {
        self.router = Some(Arc::new(router));
        self
    }

    /// Controller registered under `name`.
    pub fn get_controller(&self, name: &str) -> Option<&ControllerDescriptor> {
        self.controllers.iter().find(|controller| controller.name == name)
    }
}

impl fmt::Debug for ModuleMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleMetadata")
            .field("name", &self.name)
            .field("controllers", &self.controllers)
            .field("providers", &self.providers)
            .field("imports", &self.imports.iter().map(|m| &m.name).collect::<Vec<_>>())
            .finish()
    }
}

/// A module with its resolved scope.
#[derive(Debug, Clone)]
pub struct ModuleEntry {
    pub metadata: ModuleMetadata,
    pub scope: Scope,
}

/// The resolved module graph: one root scope holding the shared providers
/// and one child scope per module.
pub struct ModuleInjector {
    root_scope: Scope,
    modules: Vec<ModuleEntry>,
    router: Arc<dyn RouteResolver>,
    stages: Arc<[Stage]>,
}

impl ModuleInjector {
    /// Resolve the graph of module `M`.
    pub fn create<M: Module>() -> Result<Self> {
        Self::from_metadata(M::metadata())
    }

    /// Resolve `M` and fail unless it is the root module.
    pub fn create_root<M: Module>(origin: &str) -> Result<Self> {
        let metadata = M::metadata();
        if !metadata.is_root() {
            return Err(Error::routing(
                500,
                format!("{} must be initialized on the root module", origin),
                json!({ "module": metadata.name }),
            ));
        }
        Self::from_metadata(metadata)
    }

    pub fn from_metadata(metadata: ModuleMetadata) -> Result<Self> {
        let root_scope = Scope::root(metadata.shared_providers.clone())?;
        let router = metadata
            .router
            .clone()
            .unwrap_or_else(|| Arc::new(Router::new()));

        let mut modules = Vec::new();
        let mut seen = HashSet::new();
        collect_modules(&metadata, &root_scope, &mut seen, &mut modules)?;

        info!(
            root = %metadata.name,
            modules = modules.len(),
            "Module graph resolved"
        );

        Ok(Self {
            root_scope,
            modules,
            router,
            stages: Stage::ALL.into(),
        })
    }

    /// Restrict the optional stages every controller run executes.
    pub fn with_stages(mut self, stages: &[Stage]) -> Self {
        self.stages = stages.into();
        self
    }

    pub fn stages(&self) -> Arc<[Stage]> {
        self.stages.clone()
    }

    pub fn root_scope(&self) -> &Scope {
        &self.root_scope
    }

    pub fn router(&self) -> &Arc<dyn RouteResolver> {
        &self.router
    }

    pub fn modules(&self) -> &[ModuleEntry] {
        &self.modules
    }

    pub fn get_module(&self, name: &str) -> Option<&ModuleEntry> {
        self.modules.iter().find(|module| module.metadata.name == name)
    }

    pub fn root(&self) -> Option<&ModuleEntry> {
        self.get_module(ROOT_MODULE)
    }

    /// Destroy every module scope and the root scope.
    pub fn destroy(&self) {
        for module in &self.modules {
            module.scope.destroy();
        }
        self.root_scope.destroy();
    }
}

impl fmt::Debug for ModuleInjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInjector")
            .field("modules", &self.modules.iter().map(|m| &m.metadata.name).collect::<Vec<_>>())
            .field("stages", &self.stages)
            .finish()
    }
}

/// Resolve imports first so a module's scope can see the providers of the
/// modules it imports. Each module is resolved once.
fn collect_modules(
    metadata: &ModuleMetadata,
    root_scope: &Scope,
    seen: &mut HashSet<String>,
    modules: &mut Vec<ModuleEntry>,
) -> Result<()> {
    if !seen.insert(metadata.name.clone()) {
        return Ok(());
    }
    for import in &metadata.imports {
        collect_modules(import, root_scope, seen, modules)?;
    }

    let mut providers: Vec<Provider> = metadata
        .imports
        .iter()
        .flat_map(|import| import.providers.iter().cloned())
        .collect();
    providers.extend(metadata.providers.iter().cloned());

    let scope = root_scope.child(metadata.name.clone(), providers)?;
    debug!(
        module = %metadata.name,
        controllers = metadata.controllers.len(),
        "Module resolved"
    );
    modules.push(ModuleEntry {
        metadata: metadata.clone(),
        scope,
    });
    Ok(())
}
