//! Log filter configuration.
use clap::Parser;

/// Controls which log lines are emitted.
#[derive(Debug, Clone, Parser)]
pub struct LoggingConfig {
    /// Logs: filter directive, in the `RUST_LOG` syntax.
    ///
    /// Example: `info,policy_cache=debug`
    #[clap(
        long = "log-filter",
        default_value = "info",
        env = "RP_PROXY_LOG_FILTER"
    )]
    pub log_filter: String,

    /// Logs: more verbose output. `-v` logs at debug level, `-vv` at trace level. Takes
    /// precedence over `--log-filter`.
    #[clap(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl LoggingConfig {
    /// The filter directive to install.
    pub fn filter(&self) -> &str {
        match self.verbose {
            0 => &self.log_filter,
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter() {
        let config = LoggingConfig::parse_from(["my_binary"]);
        assert_eq!(config.filter(), "info");

        let config =
            LoggingConfig::parse_from(["my_binary", "--log-filter", "warn,read_service=debug"]);
        assert_eq!(config.filter(), "warn,read_service=debug");

        let config = LoggingConfig::parse_from(["my_binary", "--log-filter", "warn", "-v"]);
        assert_eq!(config.filter(), "debug");

        let config = LoggingConfig::parse_from(["my_binary", "-vvv"]);
        assert_eq!(config.filter(), "trace");
    }
}
