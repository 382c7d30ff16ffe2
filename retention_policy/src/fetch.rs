//! Retrieval of retention-policy metadata from the backend.

use std::fmt::Debug;

use async_trait::async_trait;
use observability_deps::tracing::debug;
use reqwest::{Client, StatusCode, Url};
use snafu::{ResultExt, Snafu};

use crate::{parse::ParseError, parse_show_retention_policies, Credentials, PolicySet};

/// `User-Agent` sent along metadata queries.
pub const USER_AGENT: &str = concat!("influxdb-rp-proxy/", env!("CARGO_PKG_VERSION"));

const SHOW_RETENTION_POLICIES: &str = "SHOW RETENTION POLICIES";

/// Longest backend error body quoted in [`FetchError::Status`].
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum FetchError {
    #[snafu(display("can't create metadata client: {source}"))]
    Client { source: reqwest::Error },

    #[snafu(display("can't execute 'SHOW RETENTION POLICIES' on '{database}': {source}"))]
    Request {
        database: String,
        source: reqwest::Error,
    },

    #[snafu(display("'SHOW RETENTION POLICIES' on '{database}' returned {status}: {body}"))]
    Status {
        database: String,
        status: StatusCode,
        body: String,
    },

    #[snafu(display("can't extract retention policies of '{database}': {source}"))]
    Parse {
        database: String,
        source: ParseError,
    },
}

/// Source of the retention policies of a database.
#[async_trait]
pub trait RetentionPolicyFetcher: Debug + Send + Sync + 'static {
    /// Fetch every retention policy of `database`, authenticating with `credentials`.
    async fn fetch(
        &self,
        database: &str,
        credentials: &Credentials,
    ) -> Result<PolicySet, FetchError>;
}

/// [`RetentionPolicyFetcher`] that queries the InfluxDB `/query` HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    endpoint: Url,
}

impl HttpFetcher {
    /// Create a fetcher for the backend at `endpoint`.
    pub fn new(endpoint: Url) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context(ClientSnafu)?;

        Ok(Self { client, endpoint })
    }

    fn query_url(&self, database: &str) -> Url {
        let mut url = self.endpoint.clone();
        let path = format!("{}/query", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.query_pairs_mut()
            .clear()
            .append_pair("db", database)
            .append_pair("q", SHOW_RETENTION_POLICIES)
            .append_pair("epoch", "ms");
        url
    }
}

#[async_trait]
impl RetentionPolicyFetcher for HttpFetcher {
    async fn fetch(
        &self,
        database: &str,
        credentials: &Credentials,
    ) -> Result<PolicySet, FetchError> {
        let url = self.query_url(database);
        debug!(%database, %url, "fetching retention policies");

        let response = self
            .client
            .get(url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .await
            .context(RequestSnafu { database })?;

        let status = response.status();
        let body = response.bytes().await.context(RequestSnafu { database })?;

        if !status.is_success() {
            let mut body = String::from_utf8_lossy(&body).trim().to_string();
            if body.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            return StatusSnafu {
                database,
                status,
                body,
            }
            .fail();
        }

        let policies = parse_show_retention_policies(&body).context(ParseSnafu { database })?;
        debug!(%database, count = policies.len(), "fetched retention policies");

        Ok(policies)
    }
}
