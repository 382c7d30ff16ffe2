//! Retention-policy aware Prometheus remote-read proxy in front of InfluxDB 1.x.
//!
//! Each request on [`READ_ENDPOINT`] is decoded, the retention policies of its target database
//! are resolved through a [`PolicyCache`](policy_cache::PolicyCache), the policy whose window
//! covers the query batch most tightly is picked and the request is forwarded unchanged to the
//! backend `/api/v1/prom/read` endpoint with `rp` set. The backend answer is streamed back as is.
//!
//! Every decoded query also feeds the start-drift counter exposed on [`METRICS_ENDPOINT`].

#![warn(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]

mod error;
mod extract;
mod forward;
pub mod http;
mod metrics;
mod service;

pub use error::{Error, Result};
pub use forward::{READ_PATH, RETENTION_POLICY_PARAM};
pub use http::{http_listener, serve, ListenError, METRICS_ENDPOINT, READ_ENDPOINT};
pub use metrics::DriftMetrics;
pub use service::{ReadService, ReadServiceConfig};
