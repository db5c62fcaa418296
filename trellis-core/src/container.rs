// Hierarchical dependency injection scopes

use crate::logging::{debug, trace};
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::any::{Any, TypeId, type_name};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A type-erased provider instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn(&Scope) -> Result<Instance> + Send + Sync>;
type DestroyHook = Box<dyn FnOnce() + Send>;

/// Identity under which a provider is registered.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// A concrete Rust type.
    Type { id: TypeId, name: &'static str },
    /// A string token, for values that have no dedicated type.
    Named(Cow<'static, str>),
}

impl Token {
    pub fn of<T: 'static>() -> Self {
        Token::Type {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Token::Named(name.into())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Type { name, .. } => f.write_str(name),
            Token::Named(name) => f.write_str(name),
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self)
    }
}

impl From<&'static str> for Token {
    fn from(name: &'static str) -> Self {
        Token::named(name)
    }
}

/// Types that know how to build themselves out of a scope.
pub trait Injectable: Send + Sync + Sized + 'static {
    fn create(scope: &Scope) -> Result<Self>;
}

/// A provider registration: a token plus either a ready value or a factory
/// that is run when the owning scope is created.
#[derive(Clone)]
pub struct Provider {
    token: Token,
    source: ProviderSource,
}

#[derive(Clone)]
enum ProviderSource {
    Value(Instance),
    Factory(Factory),
}

impl Provider {
    /// Register a ready value under its own type.
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::shared(Arc::new(value))
    }

    /// Register an already shared value under its own type.
    pub fn shared<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            token: Token::of::<T>(),
            source: ProviderSource::Value(value),
        }
    }

    /// Register a value under a string token.
    pub fn named<T: Send + Sync + 'static>(name: impl Into<Cow<'static, str>>, value: T) -> Self {
        Self {
            token: Token::named(name),
            source: ProviderSource::Value(Arc::new(value)),
        }
    }

    /// Register a factory producing `T` from the scope being built.
    pub fn factory<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Scope) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            token: Token::of::<T>(),
            source: ProviderSource::Factory(Arc::new(move |scope| {
                factory(scope).map(|value| Arc::new(value) as Instance)
            })),
        }
    }

    /// Register an [`Injectable`] type.
    pub fn injectable<T: Injectable>() -> Self {
        Self::factory(T::create)
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    fn resolve(&self, scope: &Scope) -> Result<Instance> {
        match &self.source {
            ProviderSource::Value(value) => Ok(value.clone()),
            ProviderSource::Factory(factory) => factory(scope),
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.source {
            ProviderSource::Value(_) => "value",
            ProviderSource::Factory(_) => "factory",
        };
        f.debug_struct("Provider")
            .field("token", &self.token)
            .field("kind", &kind)
            .finish()
    }
}

struct ScopeInner {
    name: Cow<'static, str>,
    parent: Option<Scope>,
    providers: RwLock<HashMap<Token, Instance>>,
    destroyed: AtomicBool,
    on_destroy: Mutex<Vec<DestroyHook>>,
}

/// A node in the injector tree.
///
/// Lookups fall back to the parent chain. Child scopes resolve their own
/// providers eagerly, in declaration order, so a factory can depend on any
/// provider declared before it or visible from an ancestor. Destroying a
/// scope releases its own instances and leaves the parent untouched.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// Create a root scope and resolve its providers.
    pub fn root(providers: Vec<Provider>) -> Result<Self> {
        Self::build("root", None, providers)
    }

    /// Create a child of `self` for `target` with the given provider overrides.
    pub fn child(
        &self,
        target: impl Into<Cow<'static, str>>,
        providers: Vec<Provider>,
    ) -> Result<Self> {
        if self.is_destroyed() {
            return Err(Error::DependencyInjection(format!(
                "cannot create a child of destroyed scope {}",
                self.name()
            )));
        }
        Self::build(target, Some(self.clone()), providers)
    }

    fn build(
        name: impl Into<Cow<'static, str>>,
        parent: Option<Scope>,
        providers: Vec<Provider>,
    ) -> Result<Self> {
        let scope = Scope {
            inner: Arc::new(ScopeInner {
                name: name.into(),
                parent,
                providers: RwLock::new(HashMap::with_capacity(providers.len())),
                destroyed: AtomicBool::new(false),
                on_destroy: Mutex::new(Vec::new()),
            }),
        };

        trace!(scope = %scope.name(), provider_count = providers.len(), "Resolving scope providers");
        for provider in &providers {
            let instance = provider.resolve(&scope)?;
            scope.insert(provider.token().clone(), instance);
        }
        debug!(scope = %scope.name(), "Scope created");

        Ok(scope)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn parent(&self) -> Option<&Scope> {
        self.inner.parent.as_ref()
    }

    /// Resolve a provider by type.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.get_token(&Token::of::<T>())?
            .downcast::<T>()
            .map_err(|_| Error::DependencyInjection(format!("provider is not a {}", type_name::<T>())))
    }

    /// Resolve a provider registered under a string token.
    pub fn get_named<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        let token = Token::named(name.to_string());
        self.get_token(&token)?
            .downcast::<T>()
            .map_err(|_| Error::DependencyInjection(format!("provider {} is not a {}", name, type_name::<T>())))
    }

    /// Resolve the erased instance registered for `token`.
    pub fn get_token(&self, token: &Token) -> Result<Instance> {
        if self.is_destroyed() {
            return Err(Error::DependencyInjection(format!(
                "scope {} is destroyed",
                self.name()
            )));
        }

        let mut current = Some(self);
        while let Some(scope) = current {
            if let Some(instance) = scope.inner.providers.read().get(token) {
                trace!(provider = %token, scope = %scope.name(), "Provider resolved");
                return Ok(instance.clone());
            }
            current = scope.parent();
        }

        debug!(provider = %token, scope = %self.name(), "Provider not found in scope chain");
        Err(Error::ProviderNotFound(token.to_string()))
    }

    /// Register or replace a value in this scope.
    pub fn set<T: Send + Sync + 'static>(&self, value: T) {
        self.insert(Token::of::<T>(), Arc::new(value));
    }

    pub fn set_token(&self, token: Token, instance: Instance) {
        self.insert(token, instance);
    }

    fn insert(&self, token: Token, instance: Instance) {
        trace!(provider = %token, scope = %self.name(), "Provider registered");
        self.inner.providers.write().insert(token, instance);
    }

    pub fn has<T: 'static>(&self) -> bool {
        self.has_token(&Token::of::<T>())
    }

    pub fn has_token(&self, token: &Token) -> bool {
        if self.inner.providers.read().contains_key(token) {
            return true;
        }
        self.parent().is_some_and(|parent| parent.has_token(token))
    }

    /// Run `hook` when this scope is destroyed.
    pub fn on_destroy<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_destroyed() {
            hook();
            return;
        }
        self.inner.on_destroy.lock().push(Box::new(hook));
    }

    /// Release this scope's instances. Only the first call has an effect.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let hooks = std::mem::take(&mut *self.inner.on_destroy.lock());
        for hook in hooks {
            hook();
        }
        let released = {
            let mut providers = self.inner.providers.write();
            let count = providers.len();
            providers.clear();
            count
        };
        debug!(scope = %self.name(), released, "Scope destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.name())
            .field("parent", &self.parent().map(|p| p.name().to_string()))
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Destroys the wrapped scope when dropped.
pub struct ScopeGuard(Scope);

impl ScopeGuard {
    pub fn new(scope: Scope) -> Self {
        Self(scope)
    }
}

impl Deref for ScopeGuard {
    type Target = Scope;

    fn deref(&self) -> &Scope {
        &self.0
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.0.destroy();
    }
}
