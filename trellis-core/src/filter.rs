// Filters wrapping controller runs

use crate::logging::debug;
use crate::{ChainState, ChainValue, ControllerDescriptor, Provider, Result, Scope, ScopeGuard};
use async_trait::async_trait;
use std::any::type_name;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Route pattern matching every route.
pub const ANY_ROUTE: &str = "*";

/// Declaration data of a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterMetadata {
    /// Higher priorities run first.
    pub priority: i32,
    /// `*`, an exact internal route, or `<controller>/*`.
    pub route: String,
}

impl FilterMetadata {
    pub fn new(priority: i32) -> Self {
        Self {
            priority,
            route: ANY_ROUTE.to_string(),
        }
    }

    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }
}

/// A filter runs around the controller stages of every matching route.
///
/// `before` receives the chain value before any stage runs and `after`
/// receives the chain value once the `AfterEach` stage has finished. Each
/// invocation gets a fresh instance built in its own scope.
#[async_trait]
pub trait Filter: Send + Sync + 'static {
    fn metadata() -> FilterMetadata
    where
        Self: Sized;

    fn create(scope: &Scope) -> Result<Self>
    where
        Self: Sized;

    async fn before(&self, data: ChainValue) -> Result<ChainValue>;

    async fn after(&self, data: ChainValue) -> Result<ChainValue>;
}

/// A filter type registered on a controller, erased.
#[derive(Clone)]
pub struct FilterDescriptor {
    pub name: &'static str,
    pub priority: i32,
    pub route: String,
    provider: Provider,
    resolve: fn(&Scope) -> Result<Arc<dyn Filter>>,
}

impl FilterDescriptor {
    pub fn of<F: Filter>() -> Self {
        let metadata = F::metadata();
        Self {
            name: type_name::<F>(),
            priority: metadata.priority,
            route: metadata.route,
            provider: Provider::factory(F::create),
            resolve: resolve_filter::<F>,
        }
    }

    /// Whether the filter applies to `route` served by `controller`.
    pub fn matches(&self, route: &str, controller: &str) -> bool {
        self.route == ANY_ROUTE
            || self.route == route
            || self
                .route
                .strip_suffix("/*")
                .is_some_and(|prefix| prefix == controller)
    }

    fn instantiate(&self, parent: &Scope) -> Result<(ScopeGuard, Arc<dyn Filter>)> {
        let scope = ScopeGuard::new(parent.child(self.name, vec![self.provider.clone()])?);
        let filter = (self.resolve)(&scope)?;
        Ok((scope, filter))
    }
}

impl fmt::Debug for FilterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("route", &self.route)
            .finish()
    }
}

fn resolve_filter<F: Filter>(scope: &Scope) -> Result<Arc<dyn Filter>> {
    let filter: Arc<dyn Filter> = scope.get::<F>()?;
    Ok(filter)
}

/// Run the before or after phase of every filter matching the current route.
///
/// Filters run by descending priority, ties keeping declaration order. The
/// chain-stopped flag is checked before each filter: once a filter stops the
/// chain the remaining filters of the phase are skipped but still built and
/// released.
pub async fn process_filters(
    scope: &Scope,
    controller: &ControllerDescriptor,
    state: &ChainState,
    mut chain: ChainValue,
    is_after: bool,
) -> Result<ChainValue> {
    let route = &state.route().route;
    let mut filters: Vec<&FilterDescriptor> = controller
        .filters
        .iter()
        .filter(|filter| filter.matches(route, &controller.name))
        .collect();
    filters.sort_by(|a, b| b.priority.cmp(&a.priority));

    let phase = if is_after { "after" } else { "before" };
    for descriptor in filters {
        let (_scope, filter) = descriptor.instantiate(scope)?;
        if state.is_stopped() {
            continue;
        }
        let start = Instant::now();
        chain = if is_after {
            filter.after(chain).await?
        } else {
            filter.before(chain).await?
        };
        debug!(
            filter = descriptor.name,
            phase,
            route = %route,
            elapsed_us = start.elapsed().as_micros() as u64,
            "Filter processed"
        );
    }

    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl Filter for Noop {
        fn metadata() -> FilterMetadata {
            FilterMetadata::new(5).route("home/*")
        }

        fn create(_scope: &Scope) -> Result<Self> {
            Ok(Noop)
        }

        async fn before(&self, data: ChainValue) -> Result<ChainValue> {
            Ok(data)
        }

        async fn after(&self, data: ChainValue) -> Result<ChainValue> {
            Ok(data)
        }
    }

    #[test]
    fn test_route_patterns() {
        let descriptor = FilterDescriptor::of::<Noop>();
        assert_eq!(descriptor.priority, 5);
        assert!(descriptor.matches("home/index", "home"));
        assert!(!descriptor.matches("users/index", "users"));

        let mut exact = descriptor.clone();
        exact.route = "users/view".into();
        assert!(exact.matches("users/view", "users"));
        assert!(!exact.matches("users/index", "users"));

        let mut any = descriptor;
        any.route = ANY_ROUTE.into();
        assert!(any.matches("anything/at/all", "at"));
    }

    #[test]
    fn test_filter_scope_is_released() {
        let root = Scope::root(vec![]).unwrap();
        let descriptor = FilterDescriptor::of::<Noop>();
        let (scope, _filter) = descriptor.instantiate(&root).unwrap();
        let handle = (*scope).clone();
        drop(scope);
        assert!(handle.is_destroyed());
        assert!(!root.is_destroyed());
    }
}
