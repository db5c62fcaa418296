// Routing from public URLs to internal routes

use crate::logging::{debug, trace};
use crate::{Error, HttpMethod, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;

/// A request matched to an internal route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRoute {
    pub method: HttpMethod,
    pub params: HashMap<String, String>,
    /// `module/controller/action`, or `controller/action` for the root module.
    pub route: String,
}

impl ResolvedRoute {
    pub fn new(method: HttpMethod, route: impl Into<String>, params: HashMap<String, String>) -> Self {
        Self {
            method,
            params,
            route: route.into(),
        }
    }
}

/// Maps request paths to internal routes and knows the error routes.
#[async_trait]
pub trait RouteResolver: Send + Sync {
    async fn parse_request(
        &self,
        path: &str,
        method: HttpMethod,
        headers: &HashMap<String, String>,
    ) -> Result<ResolvedRoute>;

    /// Whether an error route is configured, for `module` or globally.
    fn has_error_route(&self, module: Option<&str>) -> bool {
        self.get_error_route(module).is_some()
    }

    /// The error route for `module`, falling back to the global one.
    fn get_error_route(&self, module: Option<&str>) -> Option<String>;
}

/// One routing rule: a URL pattern (with `:name` segments) for a set of
/// methods, pointing to an internal route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub methods: Vec<HttpMethod>,
    pub url: String,
    pub route: String,
}

impl RouteRule {
    pub fn new(methods: &[HttpMethod], url: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            methods: methods.to_vec(),
            url: url.into(),
            route: route.into(),
        }
    }
}

/// Rule-table router. Rules are tried in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Router {
    rules: Vec<RouteRule>,
    error_route: Option<String>,
    module_error_routes: HashMap<String, String>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, rule: RouteRule) -> Self {
        self.add_rule(rule);
        self
    }

    pub fn add_rule(&mut self, rule: RouteRule) {
        debug!(url = %rule.url, route = %rule.route, "Route rule registered");
        self.rules.push(rule);
    }

    pub fn add_rules(&mut self, rules: impl IntoIterator<Item = RouteRule>) {
        for rule in rules {
            self.add_rule(rule);
        }
    }

    /// Set the global error route.
    pub fn error_route(mut self, route: impl Into<String>) -> Self {
        self.error_route = Some(route.into());
        self
    }

    /// Set the error route used while serving `module`.
    pub fn module_error_route(mut self, module: impl Into<String>, route: impl Into<String>) -> Self {
        self.module_error_routes.insert(module.into(), route.into());
        self
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }
}

#[async_trait]
impl RouteResolver for Router {
    async fn parse_request(
        &self,
        path: &str,
        method: HttpMethod,
        _headers: &HashMap<String, String>,
    ) -> Result<ResolvedRoute> {
        for rule in &self.rules {
            if !rule.methods.contains(&method) {
                continue;
            }
            if let Some(params) = match_path(&rule.url, path) {
                trace!(path, route = %rule.route, "Route matched");
                return Ok(ResolvedRoute::new(method, rule.route.clone(), params));
            }
        }

        Err(Error::routing(
            404,
            format!("Router.parseRequest: {} no route found, method: {}", path, method),
            json!({ "path": path, "method": method }),
        ))
    }

    fn get_error_route(&self, module: Option<&str>) -> Option<String> {
        module
            .and_then(|name| self.module_error_routes.get(name))
            .or(self.error_route.as_ref())
            .cloned()
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Captures of `pattern` over `path`, or `None` when a literal segment or the
/// segment count differs. Captured values are percent-decoded.
fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    if segments(pattern).count() != segments(path).count() {
        return None;
    }

    segments(pattern)
        .zip(segments(path))
        .try_fold(HashMap::new(), |mut captures, (expected, actual)| {
            match expected.strip_prefix(':') {
                Some(name) => {
                    captures.insert(name.to_string(), decode_component(actual));
                    Some(captures)
                }
                None => (expected == actual).then_some(captures),
            }
        })
}

/// Split a request target into its path and query string.
pub fn split_url(url: &str) -> (&str, Option<&str>) {
    let without_fragment = url.split('#').next().unwrap_or(url);
    match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_fragment, None),
    }
}

/// Parse a query string. The first occurrence of a repeated key wins.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for part in query.split('&').filter(|part| !part.is_empty()) {
        let (key, value) = part.split_once('=').unwrap_or((part, ""));
        params
            .entry(decode_component(key))
            .or_insert_with(|| decode_component(value));
    }
    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router {
        Router::new()
            .rule(RouteRule::new(&[HttpMethod::GET], "/", "home/index"))
            .rule(RouteRule::new(&[HttpMethod::GET], "/users/:id", "users/view"))
            .rule(RouteRule::new(
                &[HttpMethod::POST, HttpMethod::PUT],
                "/ajax/call",
                "home/call",
            ))
            .error_route("core/error")
            .module_error_route("admin", "admin/core/error")
    }

    #[tokio::test]
    async fn test_static_route() {
        let route = router()
            .parse_request("/", HttpMethod::GET, &HashMap::new())
            .await
            .unwrap();
        assert_eq!(route.route, "home/index");
        assert!(route.params.is_empty());
    }

    #[tokio::test]
    async fn test_path_parameter_is_decoded() {
        let route = router()
            .parse_request("/users/a%20b", HttpMethod::GET, &HashMap::new())
            .await
            .unwrap();
        assert_eq!(route.params.get("id").map(String::as_str), Some("a b"));
    }

    #[tokio::test]
    async fn test_method_must_match() {
        let err = router()
            .parse_request("/ajax/call", HttpMethod::GET, &HashMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_not_found_message() {
        let err = router()
            .parse_request("/not-found", HttpMethod::GET, &HashMap::new())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error: Router.parseRequest: /not-found no route found, method: GET"
        );
    }

    #[test]
    fn test_error_routes() {
        let router = router();
        assert!(router.has_error_route(None));
        assert_eq!(router.get_error_route(None).as_deref(), Some("core/error"));
        assert_eq!(
            router.get_error_route(Some("admin")).as_deref(),
            Some("admin/core/error")
        );
        assert_eq!(router.get_error_route(Some("shop")).as_deref(), Some("core/error"));
        assert!(!Router::new().has_error_route(None));
    }

    #[test]
    fn test_query_string() {
        let params = parse_query_string("a=1&b=hello+world&a=2&c");
        assert_eq!(params.get("a").map(String::as_str), Some("1"));
        assert_eq!(params.get("b").map(String::as_str), Some("hello world"));
        assert_eq!(params.get("c").map(String::as_str), Some(""));
    }

    #[test]
    fn test_split_url() {
        assert_eq!(split_url("/a?b=1#frag"), ("/a", Some("b=1")));
        assert_eq!(split_url("/a"), ("/a", None));
    }

    #[test]
    fn test_match_path_segments() {
        let params = match_path("/users/:id/posts/:post", "/users/7/posts/a%20b").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("7"));
        assert_eq!(params.get("post").map(String::as_str), Some("a b"));
        assert!(match_path("/users/:id", "/users/7/posts").is_none());
        assert!(match_path("/users/:id", "/teams/7").is_none());
        assert_eq!(match_path("/", "/"), Some(HashMap::new()));
    }
}
