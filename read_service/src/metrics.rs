//! Query start-drift counter.
//!
//! Buckets every query by how far back it starts ("drift", hours rounded to 3h) and by its step
//! (seconds rounded to 15s, `0` when absent). This shows which retention windows clients
//! actually need.

use clock::Time;
use observability_deps::tracing::*;
use prometheus::{IntCounterVec, Opts, Registry, TextEncoder};
use remote_read::ReadRequest;

const HOUR_MS: i128 = 60 * 60 * 1000;
const DRIFT_BUCKET_MS: i128 = 3 * HOUR_MS;
const STEP_BUCKET_MS: i128 = 15 * 1000;

/// Registry holding the start-drift counter.
#[derive(Debug, Clone)]
pub struct DriftMetrics {
    registry: Registry,
    start_drift: IntCounterVec,
}

impl DriftMetrics {
    /// Create the counter in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let start_drift = IntCounterVec::new(
            Opts::new(
                "rp_proxy_queries_startdrift_total",
                "Number of queries split by start drift and stepping. Drift is the number of \
                 hours between query start and now rounded to 3 hours. Step is the number of \
                 seconds used as stepping, rounded to 15s (0 if not present).",
            ),
            &["drift", "step"],
        )?;

        let registry = Registry::new();
        registry.register(Box::new(start_drift.clone()))?;

        Ok(Self {
            registry,
            start_drift,
        })
    }

    /// Count every query of `request` as seen at `now`.
    pub fn record(&self, request: &ReadRequest, now: Time) {
        for query in &request.queries {
            let drift = drift_hours(now.timestamp_millis(), query.effective_start_ms());
            let step = query
                .step()
                .map(|step| step_seconds(step.as_millis() as i128))
                .unwrap_or_default();

            let (drift, step) = (drift.to_string(), step.to_string());
            debug!(%drift, %step, "incrementing start drift counter");
            self.start_drift
                .with_label_values(&[drift.as_str(), step.as_str()])
                .inc();
        }
    }

    /// Current value of the counter for the given labels.
    pub fn get(&self, drift: i128, step: i128) -> u64 {
        let (drift, step) = (drift.to_string(), step.to_string());
        self.start_drift
            .with_label_values(&[drift.as_str(), step.as_str()])
            .get()
    }

    /// Prometheus text exposition of the registry, with its content type.
    pub fn encode(&self) -> Result<(String, &'static str), prometheus::Error> {
        let encoder = TextEncoder::new();
        let text = encoder.encode_to_string(&self.registry.gather())?;
        Ok((text, prometheus::TEXT_FORMAT))
    }
}

/// `value` rounded to the nearest multiple of `multiple`, halfway values away from zero.
fn round_half_away(value: i128, multiple: i128) -> i128 {
    let rem = value % multiple;
    if rem.abs() * 2 >= multiple {
        value - rem + multiple * value.signum()
    } else {
        value - rem
    }
}

fn drift_hours(now_ms: i64, start_ms: i64) -> i128 {
    let drift_ms = i128::from(now_ms) - i128::from(start_ms);
    round_half_away(drift_ms, DRIFT_BUCKET_MS) / HOUR_MS
}

fn step_seconds(step_ms: i128) -> i128 {
    round_half_away(step_ms, STEP_BUCKET_MS) / 1000
}
