//! Rewriting and forwarding of a remote-read request to the backend.

use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures::{ready, stream::BoxStream, Stream, StreamExt};
use hyper::{
    header::{HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, HOST},
    http::request::Parts,
    Body, HeaderMap, Method, Response, StatusCode, Uri,
};
use observability_deps::tracing::*;
use reqwest::{redirect, Client, Url};
use snafu::prelude::*;
use tokio::{select, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{BuildRequestSnafu, ClientSnafu, ForwardCancelledSnafu, ForwardSnafu, Result},
    extract::QueryParams,
};

/// Prometheus remote-read endpoint of the backend.
pub const READ_PATH: &str = "/api/v1/prom/read";

/// Query parameter selecting the retention policy on the backend.
pub const RETENTION_POLICY_PARAM: &str = "rp";

/// Headers that only make sense for a single connection.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Remove hop-by-hop headers, including those listed in `Connection`.
pub(crate) fn remove_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Append the client address to `X-Forwarded-For`, keeping earlier hops.
fn append_forwarded_for(headers: &mut HeaderMap, client: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    let value = if prior.is_empty() {
        client.to_string()
    } else {
        format!("{}, {client}", prior.join(", "))
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

/// Sends rewritten requests to the backend.
#[derive(Debug, Clone)]
pub(crate) struct Forwarder {
    client: Client,
    backend: Url,
}

impl Forwarder {
    pub(crate) fn new(backend: Url) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .context(ClientSnafu)?;

        Ok(Self { client, backend })
    }

    pub(crate) fn backend(&self) -> &Url {
        &self.backend
    }

    /// Backend read URL: inbound parameters are kept, `rp` is replaced by `policy`.
    pub(crate) fn target(&self, params: &QueryParams, policy: &str) -> Url {
        let mut url = self.backend.clone();
        url.set_path(READ_PATH);
        url.set_query(None);
        url.set_fragment(None);

        url.query_pairs_mut()
            .extend_pairs(params.without(RETENTION_POLICY_PARAM))
            .append_pair(RETENTION_POLICY_PARAM, policy);
        url
    }

    /// Forward the request with its original method, headers and raw body.
    ///
    /// Gives up with [`ForwardCancelled`](crate::Error::ForwardCancelled) if `ctx` is cancelled
    /// before the backend answers.
    pub(crate) async fn forward(
        &self,
        ctx: &CancellationToken,
        parts: &Parts,
        target: Url,
        body: Bytes,
        remote_addr: SocketAddr,
    ) -> Result<reqwest::Response> {
        let mut headers = parts.headers.clone();
        remove_hop_by_hop(&mut headers);
        headers.remove(HOST);
        headers.remove(CONTENT_LENGTH);
        append_forwarded_for(&mut headers, remote_addr.ip());

        let request = self
            .client
            .request(parts.method.clone(), target)
            .headers(headers)
            .body(body)
            .build()
            .context(BuildRequestSnafu)?;

        select! {
            biased;
            _ = ctx.cancelled() => ForwardCancelledSnafu.fail(),
            res = self.client.execute(request) => res.context(ForwardSnafu),
        }
    }
}

/// What the final log line of a proxied request reports.
#[derive(Debug, Clone)]
pub(crate) struct Summary {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) remote_addr: SocketAddr,
    pub(crate) database: String,
    pub(crate) policy: String,
    pub(crate) start: Instant,
}

/// Turn the backend answer into the response sent to the client.
///
/// Status and headers (minus hop-by-hop ones) are copied; the body is streamed through a
/// [`CountingStream`] that logs the outcome once the transfer ends.
pub(crate) fn into_response(backend: reqwest::Response, summary: Summary) -> Response<Body> {
    let status = backend.status();
    let mut headers = backend.headers().clone();
    remove_hop_by_hop(&mut headers);

    let body = CountingStream::new(backend.bytes_stream().boxed(), status, summary);
    let mut response = Response::new(Body::wrap_stream(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Passes the backend body through, counting bytes.
///
/// Logs at info level when the body completes, or when the client goes away first and the
/// stream is dropped unfinished.
pub(crate) struct CountingStream {
    inner: BoxStream<'static, reqwest::Result<Bytes>>,
    status: StatusCode,
    summary: Summary,
    bytes: u64,
    done: bool,
}

impl CountingStream {
    fn new(
        inner: BoxStream<'static, reqwest::Result<Bytes>>,
        status: StatusCode,
        summary: Summary,
    ) -> Self {
        Self {
            inner,
            status,
            summary,
            bytes: 0,
            done: false,
        }
    }
}

impl fmt::Debug for CountingStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingStream")
            .field("status", &self.status)
            .field("summary", &self.summary)
            .field("bytes", &self.bytes)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl Stream for CountingStream {
    type Item = reqwest::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        let item = ready!(this.inner.poll_next_unpin(cx));
        let Summary {
            method,
            uri,
            remote_addr,
            database,
            policy,
            start,
        } = &this.summary;

        match &item {
            Some(Ok(chunk)) => {
                this.bytes += chunk.len() as u64;
            }
            Some(Err(e)) => {
                error!(
                    %method,
                    %uri,
                    %remote_addr,
                    %database,
                    %policy,
                    status = this.status.as_u16(),
                    elapsed = ?start.elapsed(),
                    bytes = this.bytes,
                    %e,
                    "backend response stream failed"
                );
                this.done = true;
            }
            None => {
                info!(
                    %method,
                    %uri,
                    %remote_addr,
                    %database,
                    %policy,
                    status = this.status.as_u16(),
                    elapsed = ?start.elapsed(),
                    bytes = this.bytes,
                    "proxied remote read"
                );
                this.done = true;
            }
        }

        Poll::Ready(item)
    }
}

impl Drop for CountingStream {
    fn drop(&mut self) {
        if !self.done {
            let Summary {
                method,
                uri,
                remote_addr,
                database,
                policy,
                start,
            } = &self.summary;

            info!(
                %method,
                %uri,
                %remote_addr,
                %database,
                %policy,
                status = self.status.as_u16(),
                elapsed = ?start.elapsed(),
                bytes = self.bytes,
                "client closed the connection while streaming: aborting"
            );
        }
    }
}
