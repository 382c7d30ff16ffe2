//! Runs the proxy against an in-process fake InfluxDB.
//!
//! The fake backend answers `SHOW RETENTION POLICIES` on `/query` with three policies
//! (`two_days`, `week` and the infinite `autogen`) and records every request it receives on
//! `/api/v1/prom/read`, answering with a fixed payload.

// Workaround for "unused crate" lint false positives.
use assert_matches as _;
use async_trait as _;
use base64 as _;
use futures as _;
use prometheus as _;
use serde_urlencoded as _;
use snafu as _;

use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use clock::{MockProvider, Time, TimeProvider};
use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, StatusCode,
};
use observability_deps::tracing::Level;
use policy_cache::PolicyCache;
use read_service::{
    http_listener, serve, DriftMetrics, ReadService, ReadServiceConfig, READ_PATH,
};
use remote_read::{encode_read_request, Query, ReadRequest};
use reqwest::Url;
use retention_policy::HttpFetcher;
use test_helpers::tracing::TracingCapture;
use tokio_util::sync::CancellationToken;

const NOW_MS: i64 = 1_700_000_000_000;
const HOUR_MS: i64 = 3_600_000;

const POLICIES: &str = r#"{"results":[{"statement_id":0,"series":[{
    "columns":["name","duration","shardGroupDuration","replicaN","default"],
    "values":[
        ["autogen","0s","168h0m0s",1,true],
        ["two_days","48h0m0s","1h0m0s",1,false],
        ["week","168h0m0s","24h0m0s",1,false]
    ]}]}]}"#;

const SAMPLES: &[u8] = b"\x00snappy-compressed-read-response";

#[derive(Debug, Clone)]
struct Forwarded {
    path: String,
    query: Vec<(String, String)>,
    authorization: Option<String>,
    forwarded_for: Option<String>,
    body: Bytes,
}

type Log = Arc<Mutex<Vec<Forwarded>>>;

#[derive(Debug, Clone, Default)]
struct Backend {
    log: Log,
    /// When set, remote reads hang until the caller hangs up, then this token is cancelled.
    stall: Option<CancellationToken>,
}

async fn backend(
    Backend { log, stall }: Backend,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(url_pairs).unwrap_or_default();
    let header = |name: &str| {
        req.headers()
            .get(name)
            .map(|v| v.to_str().unwrap().to_string())
    };
    let authorization = header("authorization");
    let forwarded_for = header("x-forwarded-for");

    let response = match path.as_str() {
        "/query" => Response::new(Body::from(POLICIES)),
        READ_PATH => {
            let body = hyper::body::to_bytes(req.into_body()).await.unwrap();
            log.lock().unwrap().push(Forwarded {
                path: READ_PATH.to_string(),
                query,
                authorization,
                forwarded_for,
                body,
            });

            if let Some(aborted) = stall {
                let guard = aborted.drop_guard();
                tokio::time::sleep(Duration::from_secs(30)).await;
                guard.disarm();
            }

            Response::builder()
                .header("content-type", "application/x-protobuf")
                .header("content-encoding", "snappy")
                .body(Body::from(SAMPLES))
                .unwrap()
        }
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .unwrap(),
    };
    Ok(response)
}

fn url_pairs(query: &str) -> Vec<(String, String)> {
    let url: Url = format!("http://localhost/?{query}").parse().unwrap();
    url.query_pairs().into_owned().collect()
}

async fn start_backend(backend_state: Backend) -> Url {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = hyper::Server::from_tcp(listener)
        .unwrap()
        .serve(make_service_fn(move |_conn| {
            let state = backend_state.clone();
            async move { Ok::<_, Infallible>(service_fn(move |req| backend(state.clone(), req))) }
        }));
    tokio::spawn(server);

    format!("http://{addr}").parse().unwrap()
}

struct Proxy {
    addr: SocketAddr,
    shutdown: CancellationToken,
    metrics: Arc<DriftMetrics>,
}

async fn start_proxy(backend: Url) -> Proxy {
    let time_provider: Arc<dyn TimeProvider> = Arc::new(MockProvider::new(
        Time::from_timestamp_millis(NOW_MS).unwrap(),
    ));
    let cache = Arc::new(PolicyCache::new(
        Arc::new(HttpFetcher::new(backend.clone()).unwrap()),
        Arc::clone(&time_provider),
    ));
    let metrics = Arc::new(DriftMetrics::new().unwrap());
    let service = Arc::new(
        ReadService::new(
            ReadServiceConfig { backend },
            cache,
            Arc::clone(&metrics),
            time_provider,
        )
        .unwrap(),
    );

    let listener = http_listener("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr();
    let shutdown = CancellationToken::new();
    tokio::spawn(serve(listener, service, shutdown.clone()));

    Proxy {
        addr,
        shutdown,
        metrics,
    }
}

fn read_request(start_hours_ago: &[i64]) -> Bytes {
    let request = ReadRequest {
        queries: start_hours_ago
            .iter()
            .map(|hours| Query {
                start_timestamp_ms: NOW_MS - hours * HOUR_MS,
                end_timestamp_ms: NOW_MS,
                matchers: vec![],
                hints: None,
            })
            .collect(),
        accepted_response_types: vec![],
    };
    encode_read_request(&request).unwrap()
}

#[tokio::test]
async fn test_routes_to_closest_policy() {
    test_helpers::maybe_start_logging();
    let log = Log::default();
    let backend = start_backend(Backend {
        log: Arc::clone(&log),
        stall: None,
    })
    .await;
    let proxy = start_proxy(backend).await;
    let client = reqwest::Client::new();

    let body = read_request(&[1, 36]);
    let response = client
        .post(format!(
            "http://{}/smartread?db=telegraf&rp=forced&extra=kept",
            proxy.addr
        ))
        .basic_auth("grafana", Some("s3cr3t"))
        .header("x-forwarded-for", "192.168.1.1")
        .body(body.clone())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-encoding"], "snappy");
    assert_eq!(response.bytes().await.unwrap(), SAMPLES);

    let forwarded = log.lock().unwrap().clone();
    assert_eq!(forwarded.len(), 1);
    let forwarded = &forwarded[0];
    assert_eq!(forwarded.path, READ_PATH);
    assert_eq!(
        forwarded.query,
        [
            ("db".to_string(), "telegraf".to_string()),
            ("extra".to_string(), "kept".to_string()),
            ("rp".to_string(), "two_days".to_string()),
        ]
    );
    assert_eq!(
        forwarded.authorization.as_deref(),
        Some("Basic Z3JhZmFuYTpzM2NyM3Q=")
    );
    assert_eq!(
        forwarded.forwarded_for.as_deref(),
        Some("192.168.1.1, 127.0.0.1")
    );
    assert_eq!(forwarded.body, body);

    proxy.shutdown.cancel();
}

#[tokio::test]
async fn test_falls_back_to_infinite_policy() {
    test_helpers::maybe_start_logging();
    let log = Log::default();
    let backend = start_backend(Backend {
        log: Arc::clone(&log),
        stall: None,
    })
    .await;
    let proxy = start_proxy(backend).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/smartread?db=telegraf", proxy.addr))
        .basic_auth("grafana", Some("s3cr3t"))
        .body(read_request(&[24 * 30]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let forwarded = log.lock().unwrap().clone();
    assert!(forwarded[0]
        .query
        .contains(&("rp".to_string(), "autogen".to_string())));

    proxy.shutdown.cancel();
}

#[tokio::test]
async fn test_rejections_do_not_reach_backend() {
    test_helpers::maybe_start_logging();
    let log = Log::default();
    let backend = start_backend(Backend {
        log: Arc::clone(&log),
        stall: None,
    })
    .await;
    let proxy = start_proxy(backend).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{}/smartread", proxy.addr))
        .basic_auth("grafana", Some("s3cr3t"))
        .body(read_request(&[1]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.text().await.unwrap(),
        "can't extract database from URI parameters\n"
    );

    let response = client
        .post(format!("http://{}/smartread?db=telegraf", proxy.addr))
        .body(read_request(&[1]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .get(format!("http://{}/nope", proxy.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert!(log.lock().unwrap().is_empty());

    proxy.shutdown.cancel();
}

#[tokio::test]
async fn test_metrics_endpoint() {
    test_helpers::maybe_start_logging();
    let backend = start_backend(Backend::default()).await;
    let proxy = start_proxy(backend).await;
    let client = reqwest::Client::new();

    client
        .post(format!("http://{}/smartread?db=telegraf", proxy.addr))
        .basic_auth("grafana", Some("s3cr3t"))
        .body(read_request(&[36]))
        .send()
        .await
        .unwrap();

    // recording happens off the request path
    for _ in 0..50 {
        if proxy.metrics.get(36, 0) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let response = client
        .get(format!("http://{}/metrics", proxy.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let text = response.text().await.unwrap();
    assert!(
        text.contains(r#"rp_proxy_queries_startdrift_total{drift="36",step="0"} 1"#),
        "{text}"
    );

    proxy.shutdown.cancel();
}

#[tokio::test]
async fn test_client_disconnect_aborts_backend_read() {
    let capture = TracingCapture::new();
    let log = Log::default();
    let aborted = CancellationToken::new();
    let backend = start_backend(Backend {
        log: Arc::clone(&log),
        stall: Some(aborted.clone()),
    })
    .await;
    let proxy = start_proxy(backend).await;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    let err = client
        .post(format!("http://{}/smartread?db=telegraf", proxy.addr))
        .basic_auth("grafana", Some("s3cr3t"))
        .body(read_request(&[1]))
        .send()
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "{err}");
    drop(client);

    tokio::time::timeout(Duration::from_secs(5), aborted.cancelled())
        .await
        .expect("backend read still running after the client left");
    assert_eq!(log.lock().unwrap().len(), 1);

    for _ in 0..50 {
        if capture.contains(Level::INFO, "client closed the connection") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(
        capture.contains(Level::INFO, "client closed the connection: aborting"),
        "{capture}"
    );
    assert!(capture.events_at(Level::ERROR).is_empty(), "{capture}");

    proxy.shutdown.cancel();
}
