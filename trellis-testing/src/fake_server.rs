// In-memory server

use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::trace;
use trellis_core::{
    Error, HeaderValue, IncomingRequest, Module, ModuleInjector, RequestBody, Result,
    ServerResponse, fire_request,
};

/// Build an in-memory server for the root module `M`.
///
/// Requests are dispatched through the same resolver as the HTTP
/// transports, without sockets.
pub fn fake_http_server<M: Module>() -> Result<FakeServer> {
    let injector = ModuleInjector::create_root::<M>("Fake server")?;
    Ok(FakeServer {
        injector: Arc::new(injector),
    })
}

/// Dispatches requests straight into a module graph.
#[derive(Clone)]
pub struct FakeServer {
    injector: Arc<ModuleInjector>,
}

impl FakeServer {
    pub fn from_injector(injector: Arc<ModuleInjector>) -> Self {
        Self { injector }
    }

    pub fn injector(&self) -> &Arc<ModuleInjector> {
        &self.injector
    }

    pub async fn get(&self, url: &str) -> FakeResponse {
        self.request("GET", url).send().await
    }

    pub async fn options(&self, url: &str) -> FakeResponse {
        self.request("OPTIONS", url).send().await
    }

    pub async fn head(&self, url: &str) -> FakeResponse {
        self.request("HEAD", url).send().await
    }

    pub async fn delete(&self, url: &str) -> FakeResponse {
        self.request("DELETE", url).send().await
    }

    pub async fn trace(&self, url: &str) -> FakeResponse {
        self.request("TRACE", url).send().await
    }

    pub async fn connect(&self, url: &str) -> FakeResponse {
        self.request("CONNECT", url).send().await
    }

    pub async fn post(&self, url: &str, data: impl Into<Bytes>) -> FakeResponse {
        self.request("POST", url).body(data).send().await
    }

    pub async fn put(&self, url: &str, data: impl Into<Bytes>) -> FakeResponse {
        self.request("PUT", url).body(data).send().await
    }

    pub async fn patch(&self, url: &str, data: impl Into<Bytes>) -> FakeResponse {
        self.request("PATCH", url).body(data).send().await
    }

    /// Start a request with any method.
    pub fn request(&self, method: &str, url: &str) -> FakeRequestBuilder<'_> {
        FakeRequestBuilder {
            server: self,
            request: IncomingRequest::new(method, url),
            chunks: Vec::new(),
        }
    }
}

/// Builder for a request sent to a [`FakeServer`].
pub struct FakeRequestBuilder<'a> {
    server: &'a FakeServer,
    request: IncomingRequest,
    chunks: Vec<Bytes>,
}

impl FakeRequestBuilder<'_> {
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.request = self.request.with_header(name, value);
        self
    }

    /// Append a body chunk. Chunks are delivered asynchronously, in order,
    /// after dispatch has started.
    pub fn body(mut self, chunk: impl Into<Bytes>) -> Self {
        self.chunks.push(chunk.into());
        self
    }

    /// Mark the request as a serverless invocation.
    pub fn serverless(mut self) -> Self {
        self.request = self.request.serverless(true);
        self
    }

    pub async fn send(self) -> FakeResponse {
        let FakeRequestBuilder {
            server,
            mut request,
            chunks,
        } = self;

        if !chunks.is_empty() {
            let (sender, body) = RequestBody::channel();
            request = request.with_body(body);
            tokio::spawn(async move {
                for chunk in chunks {
                    tokio::task::yield_now().await;
                    trace!(len = chunk.len(), "Sending body chunk");
                    if sender.send(chunk).is_err() {
                        return;
                    }
                }
            });
        }

        let mut response = ServerResponse::new();
        fire_request(&server.injector, request, &mut response).await;
        FakeResponse::from(&response)
    }
}

/// A rendered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeResponse {
    pub status: u16,
    pub headers: Vec<(String, HeaderValue)>,
    pub body: Bytes,
}

impl FakeResponse {
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(Error::from)
    }
}

impl From<&ServerResponse> for FakeResponse {
    fn from(response: &ServerResponse) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().to_vec(),
            body: response.body(),
        }
    }
}
