// HTTP and HTTPS transports

use crate::logging::{debug, error, info};
use crate::tls::TlsConfig;
use crate::{
    Error, HeaderValue, HttpsConfig, IncomingRequest, Module, ModuleInjector, RequestBody, Result,
    ServerConfig, ServerResponse, fire_request,
};
use futures_util::TryStreamExt;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming as IncomingBody};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

/// A running server: the resolved module graph plus the accept loop.
pub struct ServerHandle {
    injector: Arc<ModuleInjector>,
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn injector(&self) -> &Arc<ModuleInjector> {
        &self.injector
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and release the module scopes.
    pub fn shutdown(self) {
        self.task.abort();
        self.injector.destroy();
        info!(addr = %self.local_addr, "Server stopped");
    }
}

/// Start an HTTP server for root module `M`.
pub async fn http_server<M: Module>(config: ServerConfig) -> Result<ServerHandle> {
    let injector = Arc::new(ModuleInjector::create_root::<M>("Server")?.with_stages(&config.stages));
    serve(injector, &config, None).await
}

/// Start an HTTPS server for root module `M`.
pub async fn https_server<M: Module>(config: HttpsConfig) -> Result<ServerHandle> {
    let injector =
        Arc::new(ModuleInjector::create_root::<M>("Server")?.with_stages(&config.server.stages));
    let tls = TlsConfig::from_pem_files(&config.cert_path, &config.key_path)?;
    serve(injector, &config.server, Some(TlsAcceptor::from(tls.server_config))).await
}

async fn serve(
    injector: Arc<ModuleInjector>,
    config: &ServerConfig,
    tls: Option<TlsAcceptor>,
) -> Result<ServerHandle> {
    let listener = TcpListener::bind(config.bind_address()).await?;
    let local_addr = listener.local_addr()?;
    let scheme = if tls.is_some() { "https" } else { "http" };
    info!(addr = %local_addr, scheme, "Server listening");

    let accept_injector = injector.clone();
    let task = tokio::spawn(async move {
        loop {
            let (stream, remote) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    error!(error = %err, "Failed to accept connection");
                    continue;
                }
            };
            let injector = accept_injector.clone();

            match &tls {
                Some(acceptor) => {
                    let acceptor = acceptor.clone();
                    tokio::spawn(async move {
                        match acceptor.accept(stream).await {
                            Ok(stream) => serve_connection(stream, remote, injector).await,
                            Err(err) => debug!(remote = %remote, error = %err, "TLS handshake failed"),
                        }
                    });
                }
                None => {
                    tokio::spawn(serve_connection(stream, remote, injector));
                }
            }
        }
    });

    Ok(ServerHandle {
        injector,
        local_addr,
        task,
    })
}

async fn serve_connection<S>(stream: S, remote: SocketAddr, injector: Arc<ModuleInjector>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<IncomingBody>| {
        let injector = injector.clone();
        async move { handle_request(req, remote, injector).await }
    });

    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
        debug!(remote = %remote, error = %err, "Error serving connection");
    }
}

/// Convert a hyper request, dispatch it and convert the rendered response.
async fn handle_request(
    req: Request<IncomingBody>,
    remote: SocketAddr,
    injector: Arc<ModuleInjector>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let mut request = IncomingRequest::new(parts.method.as_str(), url)
        .with_remote_addr(remote)
        .with_body(RequestBody::from_stream(
            body.into_data_stream().map_err(Error::from),
        ));
    request.http_version = format!("{:?}", parts.version);
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    let mut response = ServerResponse::new();
    fire_request(&injector, request, &mut response).await;
    Ok(into_hyper_response(&response))
}

fn into_hyper_response(response: &ServerResponse) -> Response<Full<Bytes>> {
    let mut builder =
        Response::builder().status(StatusCode::from_u16(response.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR));

    for (name, value) in response.headers() {
        match value {
            HeaderValue::Single(value) => builder = builder.header(name, value),
            HeaderValue::Multi(values) => {
                for value in values {
                    builder = builder.header(name, value);
                }
            }
        }
    }

    builder.body(Full::new(response.body())).unwrap_or_else(|err| {
        error!(error = %err, "Invalid response head");
        let mut fallback = Response::new(Full::new(Bytes::new()));
        *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}
