//! Entry point of the retention-policy aware remote-read proxy.

use std::{process::ExitCode, sync::Arc, time::Duration};

use clap::Parser;
use clap_blocks::{cache::CacheConfig, logging::LoggingConfig, proxy::ProxyConfig};
use clock::{SystemProvider, TimeProvider};
use observability_deps::tracing::*;
use policy_cache::{CleanerConfig, PolicyCache};
use read_service::{http_listener, serve, DriftMetrics, ReadService, ReadServiceConfig};
use retention_policy::HttpFetcher;
use snafu::{ResultExt, Snafu};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Upper bound on the time in-flight requests get to complete once shutdown is requested.
const HTTP_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Invalid log filter '{filter}': {source}"))]
    LogFilter {
        filter: String,
        source: tracing_subscriber::filter::ParseError,
    },

    #[snafu(display("Cannot create retention policy fetcher: {source}"))]
    Fetcher {
        source: retention_policy::FetchError,
    },

    #[snafu(display("Cannot register metrics: {source}"))]
    Metrics { source: prometheus::Error },

    #[snafu(display("Cannot create read service: {source}"))]
    Service { source: read_service::Error },

    #[snafu(display("Cannot start HTTP listener: {source}"))]
    Listen { source: read_service::ListenError },

    #[snafu(display("Error serving HTTP: {source}"))]
    ServingHttp { source: hyper::Error },

    #[snafu(display("Early HTTP shutdown"))]
    LostHttp,
}

/// Prometheus remote-read proxy that routes every query batch to the InfluxDB retention policy
/// whose window covers it most tightly.
#[derive(Debug, Parser)]
#[clap(name = "influxdb_rp_proxy", version, about, long_about = None)]
struct Config {
    #[clap(flatten)]
    proxy: ProxyConfig,

    #[clap(flatten)]
    cache: CacheConfig,

    #[clap(flatten)]
    logging: LoggingConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(%e, "proxy failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &LoggingConfig) -> Result<(), Error> {
    let filter = config.filter();
    let filter = EnvFilter::try_new(filter).context(LogFilterSnafu { filter })?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

async fn run(config: Config) -> Result<(), Error> {
    init_logging(&config.logging)?;

    info!(
        bind_addr = %config.proxy.bind_addr,
        influx_url = %config.proxy.influx_url,
        cache_check_frequency = %config.cache.check_frequency,
        cache_expiration_limit = %config.cache.expiration_limit,
        "starting retention policy proxy"
    );

    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemProvider::new());
    let fetcher = HttpFetcher::new(config.proxy.influx_url.clone()).context(FetcherSnafu)?;
    let cache = Arc::new(PolicyCache::new(Arc::new(fetcher), Arc::clone(&time_provider)));
    let metrics = Arc::new(DriftMetrics::new().context(MetricsSnafu)?);
    let service = Arc::new(
        ReadService::new(
            ReadServiceConfig::from(&config.proxy),
            Arc::clone(&cache),
            metrics,
            time_provider,
        )
        .context(ServiceSnafu)?,
    );

    let listener = http_listener(config.proxy.bind_addr)
        .await
        .context(ListenSnafu)?;
    let cleaner = cache.start_cleaner(CleanerConfig::from(&config.cache));

    let shutdown = CancellationToken::new();
    let server = serve(listener, service, shutdown.clone());
    tokio::pin!(server);

    // Shutdown happens in two steps:
    // 1. Stop accepting requests and drain the open connections
    // 2. Stop the cache cleaner
    let res = tokio::select! {
        res = &mut server => match res {
            Ok(()) => {
                error!("early HTTP server exit");
                Err(Error::LostHttp)
            }
            Err(source) => Err(Error::ServingHttp { source }),
        },
        _ = wait_for_signal() => {
            info!(timeout = ?HTTP_DRAIN_TIMEOUT, "shutdown requested, draining HTTP connections");
            shutdown.cancel();

            match tokio::time::timeout(HTTP_DRAIN_TIMEOUT, &mut server).await {
                Ok(res) => res.context(ServingHttpSnafu),
                Err(_) => {
                    warn!(timeout = ?HTTP_DRAIN_TIMEOUT, "connections still open, dropping them");
                    Ok(())
                }
            }
        }
    };
    info!("frontend shutdown completed");

    cleaner.stop().await;
    info!("backend shutdown completed");

    res
}

#[cfg(unix)]
/// Returns when SIGINT or SIGTERM is received.
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate()).expect("failed to register signal handler");
    let mut int = signal(SignalKind::interrupt()).expect("failed to register signal handler");

    tokio::select! {
        _ = term.recv() => info!("Received SIGTERM"),
        _ = int.recv() => info!("Received SIGINT"),
    }
}

#[cfg(windows)]
/// Returns on ctrl-c, the closest equivalent of SIGINT.
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
