// HTTP request and response types shared by every transport

use crate::logging::{debug, trace};
use crate::{Error, Provider, Result};
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// HTTP methods understood by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
    TRACE,
    CONNECT,
}

impl HttpMethod {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "DELETE" => Some(HttpMethod::DELETE),
            "PATCH" => Some(HttpMethod::PATCH),
            "HEAD" => Some(HttpMethod::HEAD),
            "OPTIONS" => Some(HttpMethod::OPTIONS),
            "TRACE" => Some(HttpMethod::TRACE),
            "CONNECT" => Some(HttpMethod::CONNECT),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
            HttpMethod::TRACE => "TRACE",
            HttpMethod::CONNECT => "CONNECT",
        }
    }

    /// Methods whose request body is collected before dispatch.
    pub fn has_body(&self) -> bool {
        matches!(self, HttpMethod::POST | HttpMethod::PUT | HttpMethod::PATCH)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Streamed request body. Chunks arrive in order; the stream ending marks the
/// end of the body and an `Err` item aborts it.
pub struct RequestBody {
    stream: Option<BoxStream<'static, Result<Bytes>>>,
}

impl RequestBody {
    pub fn empty() -> Self {
        Self { stream: None }
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: futures_util::Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self {
            stream: Some(stream.boxed()),
        }
    }

    pub fn from_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let chunks: Vec<Result<Bytes>> = chunks.into_iter().map(|c| Ok(c.into())).collect();
        Self::from_stream(stream::iter(chunks))
    }

    /// A body fed from elsewhere through a [`BodySender`].
    ///
    /// ```
    /// use bytes::Bytes;
    /// use trellis_core::RequestBody;
    ///
    /// # tokio_test::block_on(async {
    /// let (sender, body) = RequestBody::channel();
    /// sender.send("a").unwrap();
    /// sender.send("b").unwrap();
    /// drop(sender);
    /// assert_eq!(body.collect().await.unwrap(), vec![Bytes::from("a"), Bytes::from("b")]);
    /// # });
    /// ```
    pub fn channel() -> (BodySender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (BodySender { tx }, Self::from_stream(UnboundedReceiverStream::new(rx)))
    }

    /// Wait for the end of the body and return every chunk received.
    pub async fn collect(self) -> Result<Vec<Bytes>> {
        let Some(mut stream) = self.stream else {
            return Ok(Vec::new());
        };
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            trace!(len = chunk.len(), "Request body chunk received");
            chunks.push(chunk);
        }
        Ok(chunks)
    }
}

impl Default for RequestBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBody")
            .field("streaming", &self.stream.is_some())
            .finish()
    }
}

/// Producer side of [`RequestBody::channel`]. Dropping it ends the body.
#[derive(Clone)]
pub struct BodySender {
    tx: mpsc::UnboundedSender<Result<Bytes>>,
}

impl BodySender {
    pub fn send(&self, chunk: impl Into<Bytes>) -> Result<()> {
        self.tx
            .send(Ok(chunk.into()))
            .map_err(|_| Error::Transport("request body receiver dropped".to_string()))
    }

    /// Abort the body with an error.
    pub fn fail(self, error: Error) {
        let _ = self.tx.send(Err(error));
    }
}

/// A request as handed over by a transport adapter.
#[derive(Debug)]
pub struct IncomingRequest {
    pub method: String,
    pub url: String,
    pub http_version: String,
    /// Header names are stored lowercased.
    pub headers: HashMap<String, String>,
    pub remote_addr: Option<SocketAddr>,
    pub body: RequestBody,
    /// Extra per-request providers made visible to controllers.
    pub providers: Vec<Provider>,
    /// Serverless invocations relax the payload rules when rendering.
    pub serverless: bool,
}

impl IncomingRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            http_version: "1.1".to_string(),
            headers: HashMap::new(),
            remote_addr: None,
            body: RequestBody::empty(),
            providers: Vec::new(),
            serverless: false,
        }
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn serverless(mut self, serverless: bool) -> Self {
        self.serverless = serverless;
        self
    }
}

/// A response header value. `Multi` is emitted as repeated header lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Single(String),
    Multi(Vec<String>),
}

impl HeaderValue {
    pub fn values(&self) -> Vec<&str> {
        match self {
            HeaderValue::Single(value) => vec![value.as_str()],
            HeaderValue::Multi(values) => values.iter().map(String::as_str).collect(),
        }
    }

    pub fn as_single(&self) -> Option<&str> {
        match self {
            HeaderValue::Single(value) => Some(value),
            HeaderValue::Multi(_) => None,
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Single(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Single(value)
    }
}

impl From<Vec<String>> for HeaderValue {
    fn from(values: Vec<String>) -> Self {
        HeaderValue::Multi(values)
    }
}

type FinishHook = Box<dyn FnOnce() + Send>;

/// The response sink a request is rendered into.
///
/// Finish hooks run exactly once, either on [`ServerResponse::end`] or when
/// the response is dropped without being ended (a closed connection).
pub struct ServerResponse {
    status: u16,
    headers: Vec<(String, HeaderValue)>,
    body: BytesMut,
    headers_sent: bool,
    finished: bool,
    on_finish: Vec<FinishHook>,
}

impl ServerResponse {
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: BytesMut::new(),
            headers_sent: false,
            finished: false,
            on_finish: Vec::new(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &[(String, HeaderValue)] {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    pub fn body(&self) -> Bytes {
        self.body.clone().freeze()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Replace a header, keeping the position of an existing entry.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    pub fn write_head(&mut self, status: u16, headers: Vec<(String, HeaderValue)>) {
        if self.headers_sent {
            debug!(status, "Response head already written");
            return;
        }
        self.status = status;
        for (name, value) in headers {
            self.set_header(name, value);
        }
        self.headers_sent = true;
    }

    pub fn write(&mut self, chunk: &[u8]) {
        if self.finished {
            debug!(len = chunk.len(), "Write after end ignored");
            return;
        }
        self.headers_sent = true;
        self.body.extend_from_slice(chunk);
    }

    pub fn end(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.run_finish_hooks();
    }

    /// Register a hook for when the response is finished or dropped.
    pub fn on_finish<F>(&mut self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_finish.push(Box::new(hook));
    }

    fn run_finish_hooks(&mut self) {
        for hook in std::mem::take(&mut self.on_finish) {
            hook();
        }
    }
}

impl Default for ServerResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServerResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("finished", &self.finished)
            .finish()
    }
}

impl Drop for ServerResponse {
    fn drop(&mut self) {
        self.run_finish_hooks();
    }
}
