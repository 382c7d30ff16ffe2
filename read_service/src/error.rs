//! Failures of the remote-read pipeline and their HTTP rendering.

use hyper::{header::CONTENT_TYPE, Body, Response, StatusCode};
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[allow(missing_docs)]
pub enum Error {
    #[snafu(display("can't create backend client: {source}"))]
    Client { source: reqwest::Error },

    #[snafu(display("can't read request body: {source}"))]
    ReadBody { source: hyper::Error },

    #[snafu(display("{source}"))]
    Decode { source: remote_read::DecodeError },

    #[snafu(display("invalid query string '{query}': {source}"))]
    InvalidQueryString {
        query: String,
        source: serde_urlencoded::de::Error,
    },

    #[snafu(display("can't extract database from URI parameters"))]
    MissingDatabase,

    #[snafu(display("can't extract auth from header: {reason}"))]
    InvalidCredentials { reason: &'static str },

    #[snafu(display("can't get retention policies for '{database}' db: {source}"))]
    Policies {
        database: String,
        source: policy_cache::Error,
    },

    #[snafu(display("can't select the best retention policy: {source}"))]
    Select {
        source: retention_policy::SelectError,
    },

    #[snafu(display("can't build backend request: {source}"))]
    BuildRequest { source: reqwest::Error },

    #[snafu(display("can't forward request to backend: {source}"))]
    Forward { source: reqwest::Error },

    #[snafu(display("client went away while waiting for the backend"))]
    ForwardCancelled,
}

impl Error {
    /// HTTP status answered for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Decode { .. }
            | Self::InvalidQueryString { .. }
            | Self::MissingDatabase
            | Self::InvalidCredentials { .. }
            | Self::Select { .. } => StatusCode::BAD_REQUEST,
            Self::Client { .. }
            | Self::ReadBody { .. }
            | Self::Policies { .. }
            | Self::BuildRequest { .. }
            | Self::Forward { .. }
            | Self::ForwardCancelled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the request failed because the client went away.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Policies { source, .. } => source.is_cancelled(),
            Self::ForwardCancelled => true,
            _ => false,
        }
    }

    /// Convert the error into a plain-text [`Response`].
    pub fn response(&self) -> Response<Body> {
        let mut response = Response::new(Body::from(format!("{self}\n")));
        *response.status_mut() = self.status_code();
        response.headers_mut().insert(
            CONTENT_TYPE,
            hyper::header::HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}

/// Result type of the pipeline.
pub type Result<T, E = Error> = std::result::Result<T, E>;
