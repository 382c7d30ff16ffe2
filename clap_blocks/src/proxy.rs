//! Listener and backend configuration.
use std::net::{SocketAddr, ToSocketAddrs};

use clap::Parser;
use read_service::ReadServiceConfig;
use snafu::{OptionExt, ResultExt, Snafu};
use url::Url;

#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum ProxyConfigError {
    #[snafu(display("Cannot parse socket address '{given}': {source}"))]
    InvalidSocketAddr {
        given: String,
        source: std::io::Error,
    },

    #[snafu(display("Found no addresses for '{given}'"))]
    NoSocketAddr { given: String },

    #[snafu(display("Cannot parse URL '{given}': {source}"))]
    InvalidUrl {
        given: String,
        source: url::ParseError,
    },

    #[snafu(display("InfluxDB URL '{given}' must use http or https"))]
    UnsupportedScheme { given: String },
}

/// Resolve `host:port`, keeping the first address found.
pub fn parse_socket_addr(s: &str) -> Result<SocketAddr, ProxyConfigError> {
    s.to_socket_addrs()
        .context(InvalidSocketAddrSnafu { given: s })?
        .next()
        .context(NoSocketAddrSnafu { given: s })
}

/// Parse the backend URL, accepting only `http` and `https`.
pub fn parse_influx_url(s: &str) -> Result<Url, ProxyConfigError> {
    let url = Url::parse(s).context(InvalidUrlSnafu { given: s })?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => UnsupportedSchemeSnafu { given: s }.fail(),
    }
}

/// Where the proxy listens and which InfluxDB it fronts.
#[derive(Debug, Clone, Parser)]
pub struct ProxyConfig {
    /// Address the HTTP listener binds to.
    #[clap(
        long = "bind-addr",
        default_value = "0.0.0.0:9404",
        value_parser = parse_socket_addr,
        env = "RP_PROXY_BIND_ADDR"
    )]
    pub bind_addr: SocketAddr,

    /// Base URL of the InfluxDB 1.x backend, used for both metadata queries and remote reads.
    #[clap(
        long = "influx-url",
        default_value = "http://127.0.0.1:8086",
        value_parser = parse_influx_url,
        env = "RP_PROXY_INFLUX_URL"
    )]
    pub influx_url: Url,
}

impl From<&ProxyConfig> for ReadServiceConfig {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            backend: config.influx_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::parse_from(["my_binary"]);

        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 9404)));
        assert_eq!(config.influx_url.as_str(), "http://127.0.0.1:8086/");

        let service = ReadServiceConfig::from(&config);
        assert_eq!(service.backend, config.influx_url);
    }

    #[test]
    fn test_socket_addr() {
        let config = ProxyConfig::parse_from(["my_binary", "--bind-addr", "127.0.0.1:1234"]);
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 1234)));

        let addr = parse_socket_addr("localhost:1234").unwrap();
        // localhost resolves to either family depending on the host
        match addr {
            SocketAddr::V4(so) => {
                assert_eq!(so, SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 1234))
            }
            SocketAddr::V6(so) => assert_eq!(
                so,
                SocketAddrV6::new(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1), 1234, 0, 0)
            ),
        };

        assert_eq!(
            parse_socket_addr("!@INv_a1d(ad0/resp_!").unwrap_err().to_string(),
            "Cannot parse socket address '!@INv_a1d(ad0/resp_!': invalid socket address",
        );
    }

    #[test]
    fn test_influx_url() {
        let config = ProxyConfig::parse_from([
            "my_binary",
            "--influx-url",
            "https://influx.example.com:8443/prefix",
        ]);
        assert_eq!(config.influx_url.host_str(), Some("influx.example.com"));
        assert_eq!(config.influx_url.path(), "/prefix");

        assert_eq!(
            parse_influx_url("unix:///var/run/influx.sock")
                .unwrap_err()
                .to_string(),
            "InfluxDB URL 'unix:///var/run/influx.sock' must use http or https"
        );
        assert!(matches!(
            parse_influx_url("not a url"),
            Err(ProxyConfigError::InvalidUrl { .. })
        ));
    }
}
