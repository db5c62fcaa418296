// Tests for hierarchical injection scopes

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use trellis_core::{Error, Injectable, Provider, Scope, ScopeGuard, Token};

struct Database {
    url: String,
}

struct Repository {
    db: Arc<Database>,
    table: &'static str,
}

impl Injectable for Repository {
    fn create(scope: &Scope) -> Result<Self, Error> {
        Ok(Repository {
            db: scope.get::<Database>()?,
            table: "users",
        })
    }
}

#[test]
fn test_root_scope_resolves_values() {
    let root = Scope::root(vec![Provider::value(Database {
        url: "postgres://db".to_string(),
    })])
    .unwrap();

    assert_eq!(root.get::<Database>().unwrap().url, "postgres://db");
    assert!(root.has::<Database>());
    assert!(!root.has::<Repository>());
}

#[test]
fn test_child_sees_parent_providers() {
    let root = Scope::root(vec![Provider::value(Database {
        url: "sqlite::memory:".to_string(),
    })])
    .unwrap();
    let child = root.child("request", vec![Provider::injectable::<Repository>()]).unwrap();

    let repo = child.get::<Repository>().unwrap();
    assert_eq!(repo.table, "users");
    assert_eq!(repo.db.url, "sqlite::memory:");
    assert!(Arc::ptr_eq(&repo.db, &root.get::<Database>().unwrap()));
    assert!(root.get::<Repository>().is_err());
}

#[test]
fn test_child_override_shadows_parent() {
    let root = Scope::root(vec![Provider::value(Database {
        url: "primary".to_string(),
    })])
    .unwrap();
    let child = root
        .child(
            "replica",
            vec![Provider::value(Database {
                url: "replica".to_string(),
            })],
        )
        .unwrap();

    assert_eq!(child.get::<Database>().unwrap().url, "replica");
    assert_eq!(root.get::<Database>().unwrap().url, "primary");
}

#[test]
fn test_factory_sees_earlier_providers() {
    let root = Scope::root(vec![]).unwrap();
    let child = root
        .child(
            "ordered",
            vec![
                Provider::value(Database {
                    url: "local".to_string(),
                }),
                Provider::injectable::<Repository>(),
            ],
        )
        .unwrap();

    assert_eq!(child.get::<Repository>().unwrap().db.url, "local");
}

#[test]
fn test_missing_provider_fails_scope_creation() {
    let root = Scope::root(vec![]).unwrap();
    let err = root
        .child("broken", vec![Provider::injectable::<Repository>()])
        .unwrap_err();
    assert!(matches!(err, Error::ProviderNotFound(_)));
}

#[test]
fn test_named_tokens() {
    let root = Scope::root(vec![Provider::named("api_key", "secret".to_string())]).unwrap();
    assert_eq!(root.get_named::<String>("api_key").unwrap().as_str(), "secret");
    assert!(root.has_token(&Token::named("api_key")));
    assert!(root.get_named::<u32>("api_key").is_err());
}

#[test]
fn test_set_replaces_value() {
    let root = Scope::root(vec![]).unwrap();
    root.set(42u32);
    root.set(7u32);
    assert_eq!(*root.get::<u32>().unwrap(), 7);
}

#[test]
fn test_destroy_child_keeps_parent() {
    let root = Scope::root(vec![Provider::value(1u8)]).unwrap();
    let child = root.child("child", vec![Provider::value(2u16)]).unwrap();

    child.destroy();

    assert!(child.is_destroyed());
    assert!(child.get::<u16>().is_err());
    assert_eq!(*root.get::<u8>().unwrap(), 1);
    assert!(root.child("again", vec![]).is_ok());
    assert!(child.child("grandchild", vec![]).is_err());
}

#[test]
fn test_destroy_hooks_run_once() {
    let count = Arc::new(AtomicUsize::new(0));
    let scope = Scope::root(vec![]).unwrap();
    let hook_count = count.clone();
    scope.on_destroy(move || {
        hook_count.fetch_add(1, Ordering::SeqCst);
    });

    scope.destroy();
    scope.destroy();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_guard_destroys_on_drop() {
    let root = Scope::root(vec![]).unwrap();
    let handle = {
        let guard = ScopeGuard::new(root.child("filter", vec![]).unwrap());
        (*guard).clone()
    };
    assert!(handle.is_destroyed());
    assert!(!root.is_destroyed());
}
