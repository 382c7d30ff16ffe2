//! HTTP front-end: listener, routing and graceful shutdown.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use hyper::{
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::{AddrIncoming, AddrStream},
    Body, Method, Request, Response, StatusCode,
};
use observability_deps::tracing::*;
use snafu::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::ReadService;

/// Path of the remote-read endpoint.
pub const READ_ENDPOINT: &str = "/smartread";

/// Path of the Prometheus metrics endpoint.
pub const METRICS_ENDPOINT: &str = "/metrics";

#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum ListenError {
    #[snafu(display("can't bind to {addr}: {source}"))]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[snafu(display("can't accept connections on {addr}: {source}"))]
    Accept {
        addr: SocketAddr,
        source: hyper::Error,
    },
}

/// Bind the HTTP listener.
pub async fn http_listener(addr: SocketAddr) -> Result<AddrIncoming, ListenError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(BindSnafu { addr })?;

    let listener = AddrIncoming::from_listener(listener).context(AcceptSnafu { addr })?;
    info!(bind_addr=%listener.local_addr(), "bound HTTP listener");

    Ok(listener)
}

/// Serve `service` on `listener` until `shutdown` is cancelled, then drain open connections.
pub async fn serve(
    listener: AddrIncoming,
    service: Arc<ReadService>,
    shutdown: CancellationToken,
) -> Result<(), hyper::Error> {
    hyper::Server::builder(listener)
        .tcp_nodelay(true)
        .serve(hyper::service::make_service_fn(|conn: &AddrStream| {
            let service = Arc::clone(&service);
            let remote_addr = conn.remote_addr();
            let svc = hyper::service::service_fn(move |request: Request<Body>| {
                route_request(Arc::clone(&service), request, remote_addr)
            });
            futures::future::ready(Ok::<_, Infallible>(svc))
        }))
        .with_graceful_shutdown(shutdown.cancelled())
        .await
}

async fn route_request(
    service: Arc<ReadService>,
    req: Request<Body>,
    remote_addr: SocketAddr,
) -> Result<Response<Body>, Infallible> {
    debug!(method = %req.method(), uri = %req.uri(), %remote_addr, "processing request");

    let response = match (req.method(), req.uri().path()) {
        (_, READ_ENDPOINT) => smart_read(service, req, remote_addr).await,
        (&Method::GET, METRICS_ENDPOINT) => handle_metrics(&service),
        _ => not_found(),
    };

    Ok(response)
}

/// Run the pipeline in its own task, bound to a token cancelled if hyper drops this future.
///
/// hyper drops the response future when the client disconnects, which cancels the token and
/// lets the pipeline abandon pending policy fetches and backend calls.
async fn smart_read(
    service: Arc<ReadService>,
    req: Request<Body>,
    remote_addr: SocketAddr,
) -> Response<Body> {
    let ctx = CancellationToken::new();
    let guard = ctx.clone().drop_guard();

    let handler = tokio::spawn(async move { service.handle(&ctx, req, remote_addr).await });
    let response = match handler.await {
        Ok(response) => response,
        Err(e) => {
            error!(%e, %remote_addr, "remote read handler failed");
            status_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error\n")
        }
    };

    guard.disarm();
    response
}

fn handle_metrics(service: &ReadService) -> Response<Body> {
    match service.metrics().encode() {
        Ok((body, content_type)) => {
            let mut response = Response::new(Body::from(body));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            response
        }
        Err(e) => {
            error!(%e, "can't encode metrics");
            status_response(StatusCode::INTERNAL_SERVER_ERROR, "can't encode metrics\n")
        }
    }
}

fn not_found() -> Response<Body> {
    status_response(StatusCode::NOT_FOUND, "not found\n")
}

fn status_response(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}
