// Per-request state shared between the resolver and controllers

use crate::chain::DEFAULT_CONTENT_TYPE;
use crate::logging::debug;
use crate::{Error, HeaderValue, HttpMethod, IncomingRequest, ResolvedRoute};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

type TeardownHook = Box<dyn FnOnce() + Send>;

/// A pending redirect requested by a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub url: String,
    pub code: u16,
}

/// Connection details of the client that sent the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub remote_addr: Option<SocketAddr>,
    pub http_version: String,
}

/// State owned by one request for its whole lifetime.
///
/// Controllers write to it through [`Request`]; the request resolver reads
/// it back once the chain has finished.
pub struct RequestContext {
    id: String,
    method: String,
    url: String,
    headers: HashMap<String, String>,
    connection: ConnectionInfo,
    serverless: bool,
    body: RwLock<Vec<Bytes>>,
    status: AtomicU16,
    content_type: RwLock<String>,
    redirect: RwLock<Option<Redirect>>,
    response_headers: Mutex<Vec<(String, HeaderValue)>>,
    teardown: Mutex<Vec<TeardownHook>>,
    torn_down: AtomicBool,
}

impl RequestContext {
    pub fn new(request: &IncomingRequest) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            connection: ConnectionInfo {
                remote_addr: request.remote_addr,
                http_version: request.http_version.clone(),
            },
            serverless: request.serverless,
            body: RwLock::new(Vec::new()),
            status: AtomicU16::new(200),
            content_type: RwLock::new(DEFAULT_CONTENT_TYPE.to_string()),
            redirect: RwLock::new(None),
            response_headers: Mutex::new(Vec::new()),
            teardown: Mutex::new(Vec::new()),
            torn_down: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    pub fn is_serverless(&self) -> bool {
        self.serverless
    }

    pub fn set_body(&self, chunks: Vec<Bytes>) {
        *self.body.write() = chunks;
    }

    /// The request body concatenated into one buffer.
    pub fn body(&self) -> Bytes {
        let chunks = self.body.read();
        match chunks.as_slice() {
            [] => Bytes::new(),
            [single] => single.clone(),
            many => Bytes::from(many.concat()),
        }
    }

    pub fn status(&self) -> u16 {
        self.status.load(Ordering::SeqCst)
    }

    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn content_type(&self) -> String {
        self.content_type.read().clone()
    }

    pub fn set_content_type(&self, content_type: impl Into<String>) {
        *self.content_type.write() = content_type.into();
    }

    pub fn redirect(&self) -> Option<Redirect> {
        self.redirect.read().clone()
    }

    pub fn set_redirect(&self, redirect: Redirect) {
        *self.redirect.write() = Some(redirect);
    }

    /// Queue a response header; it is applied when the response is rendered.
    pub fn set_response_header(&self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        let name = name.into();
        let value = value.into();
        let mut headers = self.response_headers.lock();
        match headers.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => headers.push((name, value)),
        }
    }

    fn append_response_header(&self, name: &str, value: String) {
        let mut headers = self.response_headers.lock();
        match headers.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(name)) {
            Some((_, existing)) => {
                let mut values: Vec<String> =
                    existing.values().into_iter().map(str::to_string).collect();
                values.push(value);
                *existing = HeaderValue::Multi(values);
            }
            None => headers.push((name.to_string(), HeaderValue::Single(value))),
        }
    }

    pub fn response_headers(&self) -> Vec<(String, HeaderValue)> {
        self.response_headers.lock().clone()
    }

    /// Run `hook` once the request is torn down.
    pub fn on_teardown<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.torn_down.load(Ordering::SeqCst) {
            hook();
            return;
        }
        self.teardown.lock().push(Box::new(hook));
    }

    /// Release everything scoped to this request. Only the first call runs
    /// the registered hooks.
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let hooks = std::mem::take(&mut *self.teardown.lock());
        debug!(request_id = %self.id, hooks = hooks.len(), "Request torn down");
        for hook in hooks {
            hook();
        }
    }
}

/// State of one controller run: the chain-stopped flag, the route and action
/// being served and the error (if any) being rendered.
pub struct ChainState {
    stopped: AtomicBool,
    route: ResolvedRoute,
    action: String,
    error: Error,
}

impl ChainState {
    pub fn new(route: ResolvedRoute, action: impl Into<String>, error: Error) -> Self {
        Self {
            stopped: AtomicBool::new(false),
            route,
            action: action.into(),
            error,
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn route(&self) -> &ResolvedRoute {
        &self.route
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn error(&self) -> &Error {
        &self.error
    }
}

/// Cookie expiry for [`Request::set_cookie`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieExpiry {
    /// Relative to now.
    After(Duration),
    At(SystemTime),
    /// Emitted verbatim.
    Raw(String),
}

impl CookieExpiry {
    fn to_header(&self) -> String {
        match self {
            CookieExpiry::After(duration) => httpdate::fmt_http_date(SystemTime::now() + *duration),
            CookieExpiry::At(time) => httpdate::fmt_http_date(*time),
            CookieExpiry::Raw(raw) => raw.clone(),
        }
    }
}

/// Attributes of a cookie set through [`Request::set_cookie`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieOptions {
    pub expires: Option<CookieExpiry>,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub http_only: bool,
}

/// Handle given to controllers and filters to read the request and control
/// the response.
#[derive(Clone)]
pub struct Request {
    context: Arc<RequestContext>,
    chain: Arc<ChainState>,
}

impl Request {
    pub fn new(context: Arc<RequestContext>, chain: Arc<ChainState>) -> Self {
        Self { context, chain }
    }

    /// Skip every remaining stage and filter of the current run.
    pub fn stop_chain(&self) {
        self.chain.stop();
    }

    pub fn is_chain_stopped(&self) -> bool {
        self.chain.is_stopped()
    }

    /// Redirect instead of rendering the chain result. Stops the chain.
    pub fn redirect_to(&self, url: impl Into<String>, code: u16) {
        self.chain.stop();
        self.context.set_redirect(Redirect {
            url: url.into(),
            code,
        });
    }

    pub fn set_status_code(&self, status: u16) {
        self.context.set_status(status);
    }

    pub fn status_code(&self) -> u16 {
        self.context.status()
    }

    pub fn set_content_type(&self, content_type: impl Into<String>) {
        self.context.set_content_type(content_type);
    }

    pub fn content_type(&self) -> String {
        self.context.content_type()
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.chain.route().params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.chain.route().params.get(name).map(String::as_str)
    }

    pub fn method(&self) -> HttpMethod {
        self.chain.route().method
    }

    /// The internal route, `module/controller/action` or `controller/action`.
    pub fn route(&self) -> &str {
        &self.chain.route().route
    }

    pub fn action(&self) -> &str {
        self.chain.action()
    }

    pub fn url(&self) -> &str {
        self.context.url()
    }

    pub fn body(&self) -> Bytes {
        self.context.body()
    }

    pub fn request_headers(&self) -> &HashMap<String, String> {
        self.context.headers()
    }

    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.context
            .headers()
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Cookies sent with the request.
    pub fn cookies(&self) -> HashMap<String, String> {
        self.request_header("cookie")
            .map(parse_cookies)
            .unwrap_or_default()
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies().remove(name)
    }

    /// Add a `Set-Cookie` response header. Repeated calls add more cookies.
    pub fn set_cookie(&self, name: &str, value: &str, options: CookieOptions) {
        let mut cookie = format!("{}={}", name, value);
        if let Some(expires) = &options.expires {
            cookie.push_str("; Expires=");
            cookie.push_str(&expires.to_header());
        }
        if let Some(path) = &options.path {
            cookie.push_str("; Path=");
            cookie.push_str(path);
        }
        if let Some(domain) = &options.domain {
            cookie.push_str("; Domain=");
            cookie.push_str(domain);
        }
        if options.http_only {
            cookie.push_str("; HttpOnly");
        }
        self.context.append_response_header("Set-Cookie", cookie);
    }

    pub fn set_response_header(&self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        self.context.set_response_header(name, value);
    }

    /// Run `hook` when the response finishes or the connection closes.
    pub fn on_destroy<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.context.on_teardown(hook);
    }

    pub fn connection(&self) -> &ConnectionInfo {
        self.context.connection()
    }

    /// Unique id of this request.
    pub fn id(&self) -> &str {
        self.context.id()
    }

    /// The error being handled when this run serves an error route.
    pub fn error(&self) -> &Error {
        self.chain.error()
    }

    pub fn context(&self) -> &Arc<RequestContext> {
        &self.context
    }
}

fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() || value.is_empty() {
                return None;
            }
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)]) -> Request {
        let mut incoming = IncomingRequest::new("GET", "/home");
        for (name, value) in headers {
            incoming = incoming.with_header(name, *value);
        }
        let context = Arc::new(RequestContext::new(&incoming));
        let mut params = HashMap::new();
        params.insert("id".to_string(), "7".to_string());
        let route = ResolvedRoute::new(HttpMethod::GET, "home/index", params);
        Request::new(context, Arc::new(ChainState::new(route, "index", Error::empty())))
    }

    #[test]
    fn test_redirect_stops_chain() {
        let request = request(&[]);
        request.redirect_to("/login", 302);
        assert!(request.is_chain_stopped());
        assert_eq!(
            request.context().redirect(),
            Some(Redirect {
                url: "/login".to_string(),
                code: 302
            })
        );
    }

    #[test]
    fn test_cookie_parsing() {
        let request = request(&[("Cookie", "session=abc; theme=dark")]);
        assert_eq!(request.cookie("session").as_deref(), Some("abc"));
        assert_eq!(request.cookie("theme").as_deref(), Some("dark"));
        assert_eq!(request.cookie("missing"), None);
    }

    #[test]
    fn test_set_cookie_attributes() {
        let request = request(&[]);
        request.set_cookie(
            "a",
            "1",
            CookieOptions {
                expires: Some(CookieExpiry::Raw("Thu, 01 Jan 2099 00:00:00 GMT".into())),
                path: Some("/".into()),
                domain: Some("example.com".into()),
                http_only: true,
            },
        );
        request.set_cookie("b", "2", CookieOptions::default());
        let headers = request.context().response_headers();
        assert_eq!(
            headers,
            vec![(
                "Set-Cookie".to_string(),
                HeaderValue::Multi(vec![
                    "a=1; Expires=Thu, 01 Jan 2099 00:00:00 GMT; Path=/; Domain=example.com; HttpOnly"
                        .to_string(),
                    "b=2".to_string(),
                ])
            )]
        );
    }

    #[test]
    fn test_request_headers_are_case_insensitive() {
        let request = request(&[("X-Trace", "t1")]);
        assert_eq!(request.request_header("x-trace"), Some("t1"));
        assert_eq!(request.request_header("X-TRACE"), Some("t1"));
        assert_eq!(request.param("id"), Some("7"));
        assert_eq!(request.route(), "home/index");
    }

    #[test]
    fn test_teardown_runs_once() {
        let request = request(&[]);
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let hook_count = count.clone();
        request.on_destroy(move || {
            hook_count.fetch_add(1, Ordering::SeqCst);
        });
        request.context().teardown();
        request.context().teardown();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
