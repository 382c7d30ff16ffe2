//! Target database and credentials of an inbound request.

use base64::{prelude::BASE64_STANDARD, Engine};
use hyper::{header::AUTHORIZATION, HeaderMap};
use retention_policy::Credentials;
use snafu::prelude::*;

use crate::error::{
    InvalidCredentialsSnafu, InvalidQueryStringSnafu, MissingDatabaseSnafu, Result,
};

/// Name of the query parameter carrying the database.
pub(crate) const DATABASE_PARAM: &str = "db";

/// Decoded query string of an inbound request, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    /// Decode an `application/x-www-form-urlencoded` query string.
    pub(crate) fn parse(query: Option<&str>) -> Result<Self> {
        let query = query.unwrap_or_default();
        let pairs = serde_urlencoded::from_str(query).context(InvalidQueryStringSnafu { query })?;
        Ok(Self(pairs))
    }

    /// First non-empty `db` parameter.
    pub(crate) fn database(&self) -> Result<&str> {
        self.0
            .iter()
            .find(|(k, v)| k == DATABASE_PARAM && !v.is_empty())
            .map(|(_, v)| v.as_str())
            .context(MissingDatabaseSnafu)
    }

    /// Every pair except those named `name`.
    pub(crate) fn without<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k != name)
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Extract HTTP Basic credentials from the `Authorization` header.
pub(crate) fn basic_auth(headers: &HeaderMap) -> Result<Credentials> {
    let header = headers
        .get(AUTHORIZATION)
        .context(InvalidCredentialsSnafu {
            reason: "no Authorization header",
        })?
        .to_str()
        .ok()
        .context(InvalidCredentialsSnafu {
            reason: "Authorization header is not valid ASCII",
        })?;

    let encoded = header
        .split_once(' ')
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("basic"))
        .map(|(_, encoded)| encoded.trim())
        .context(InvalidCredentialsSnafu {
            reason: "Authorization scheme is not Basic",
        })?;

    let decoded = BASE64_STANDARD
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .context(InvalidCredentialsSnafu {
            reason: "Basic credentials are not valid base64 UTF-8",
        })?;

    let (username, password) = decoded.split_once(':').context(InvalidCredentialsSnafu {
        reason: "Basic credentials have no ':' separator",
    })?;

    Ok(Credentials::new(username, password))
}
