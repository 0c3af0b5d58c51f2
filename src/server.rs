//! HTTP/1.1 host for a [`Handler`].
//!
//! Each request body is buffered in full before evaluation. Unmatched
//! requests get the configured fallback status with an empty body; the
//! handler itself writes nothing for them.

use crate::config::ServerSettings;
use crate::handler::{Handler, Outcome};
use crate::request::MockRequest;
use crate::response::RecordedResponse;
use anyhow::Context;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A running listener serving one handler. Stops when dropped.
pub struct MockServer {
    addr: SocketAddr,
    handler: Handler,
    join_handle: JoinHandle<()>,
}

impl MockServer {
    /// Serve `handler` on a random local port with default settings.
    pub async fn start(handler: Handler) -> anyhow::Result<Self> {
        let settings = ServerSettings {
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..ServerSettings::default()
        };
        Self::bind(handler, &settings).await
    }

    /// Serve `handler` on `settings.listen`.
    pub async fn bind(handler: Handler, settings: &ServerSettings) -> anyhow::Result<Self> {
        let unmatched_status = StatusCode::from_u16(settings.unmatched_status)
            .with_context(|| format!("invalid unmatched status {}", settings.unmatched_status))?;

        let listener = TcpListener::bind(settings.listen)
            .await
            .with_context(|| format!("bind TCP listener on {}", settings.listen))?;
        let addr = listener
            .local_addr()
            .context("get listener socket address")?;

        info!(%addr, rules = handler.rules().len(), "Mock handler listening");

        let join_handle = {
            let handler = handler.clone();
            tokio::spawn(async move {
                loop {
                    let (stream, peer) = match listener.accept().await {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!(error = %err, "Failed to accept TCP connection");
                            continue;
                        }
                    };
                    debug!(%peer, "Accepted connection");

                    let handler = handler.clone();
                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let handler = handler.clone();
                            async move {
                                Ok::<_, Infallible>(dispatch(&handler, req, unmatched_status).await)
                            }
                        });

                        if let Err(err) = http1::Builder::new()
                            .keep_alive(true)
                            .serve_connection(TokioIo::new(stream), service)
                            .await
                        {
                            warn!(%peer, error = %err, "Error while serving HTTP connection");
                        }
                    });
                }
            })
        };

        Ok(Self {
            addr,
            handler,
            join_handle,
        })
    }

    /// Socket address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Absolute URL for `path_and_query` on this server.
    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.addr, path_and_query)
    }

    /// The handler being served.
    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}

async fn dispatch(
    handler: &Handler,
    req: Request<Incoming>,
    unmatched_status: StatusCode,
) -> Response<Full<Bytes>> {
    let request = match into_mock_request(req).await {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, "Failed to read request body");
            return empty_response(StatusCode::BAD_REQUEST);
        }
    };

    let mut recorded = RecordedResponse::new();
    match handler.serve(&request, &mut recorded) {
        Outcome::Matched { .. } => into_hyper_response(recorded),
        Outcome::Unmatched => empty_response(unmatched_status),
    }
}

/// Buffer a hyper request into a [`MockRequest`]. Non-UTF-8 header values
/// are skipped.
pub async fn into_mock_request(req: Request<Incoming>) -> Result<MockRequest, hyper::Error> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();

    let mut request = MockRequest::new(parts.method.as_str(), parts.uri.path());
    if let Some(query) = parts.uri.query() {
        request = request.with_query(query);
    }
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    Ok(request.with_body(body.to_vec()))
}

fn into_hyper_response(recorded: RecordedResponse) -> Response<Full<Bytes>> {
    let status = match recorded.status().map(StatusCode::from_u16) {
        None => StatusCode::OK,
        Some(Ok(status)) => status,
        Some(Err(_)) => {
            warn!(status = ?recorded.status(), "Rule set a status outside 100-999");
            return empty_response(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let mut builder = Response::builder().status(status);
    for (name, value) in recorded.headers() {
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder
        .body(Full::new(Bytes::from(recorded.body().to_vec())))
        .unwrap_or_else(|err| {
            warn!(error = %err, "Rule produced an invalid response");
            empty_response(StatusCode::INTERNAL_SERVER_ERROR)
        })
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}
