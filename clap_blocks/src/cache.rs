//! Policy cache configuration.
use clap::Parser;
use humantime::{format_duration, parse_duration};
use policy_cache::CleanerConfig;
use snafu::{ensure, ResultExt, Snafu};
use std::time::Duration;

/// A non-zero duration parsed with [`humantime::parse_duration`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd)]
pub struct PositiveDuration {
    inner: Duration,
}

impl PositiveDuration {
    /// Parse `d` and reject zero.
    pub fn try_new(d: &str) -> Result<Self, PositiveDurationError> {
        let duration = parse_duration(d).context(InvalidSnafu {
            given: d.to_string(),
        })?;

        ensure!(!duration.is_zero(), ZeroSnafu { given: d.to_string() });

        Ok(Self { inner: duration })
    }

    /// Read access to the inner [`Duration`].
    pub fn duration(&self) -> Duration {
        self.inner
    }
}

impl std::fmt::Display for PositiveDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_duration(self.inner))
    }
}

#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum PositiveDurationError {
    #[snafu(display("Duration must be greater than zero, was specified as `{given}`"))]
    Zero { given: String },

    #[snafu(display("Unable to parse duration from `{given}`: {source}"))]
    Invalid {
        given: String,
        source: humantime::DurationError,
    },
}

/// Configuration of the retention-policy cache and its cleaner.
#[derive(Debug, Clone, Copy, Parser)]
pub struct CacheConfig {
    /// How often the cleaner looks for expired cache entries.
    ///
    /// Parsed with <https://docs.rs/humantime/latest/humantime/fn.parse_duration.html>
    #[clap(
        long = "cache-check-frequency",
        default_value = "1h",
        value_parser = PositiveDuration::try_new,
        env = "RP_PROXY_CACHE_CHECK_FREQUENCY"
    )]
    pub check_frequency: PositiveDuration,

    /// Age after which the policies of a database are fetched again. The limit is absolute:
    /// lookups do not extend it.
    ///
    /// Parsed with <https://docs.rs/humantime/latest/humantime/fn.parse_duration.html>
    #[clap(
        long = "cache-expiration-limit",
        default_value = "24h",
        value_parser = PositiveDuration::try_new,
        env = "RP_PROXY_CACHE_EXPIRATION_LIMIT"
    )]
    pub expiration_limit: PositiveDuration,
}

impl From<&CacheConfig> for CleanerConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            check_frequency: config.check_frequency.duration(),
            expiration_limit: config.expiration_limit.duration(),
        }
    }
}
