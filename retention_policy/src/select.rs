//! Closest-fit retention policy selection.

use std::time::Duration;

use clock::Time;
use remote_read::Query;
use snafu::{ensure, OptionExt, Snafu};

use crate::{PolicySet, RetentionPolicy};

#[derive(Debug, Clone, Copy, Snafu, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SelectError {
    #[snafu(display("there must be at least one query"))]
    NoQueries,

    #[snafu(display("database has no retention policy"))]
    NoPolicies,

    #[snafu(display(
        "no retention policy among {count} covers data starting at {earliest_start_ms}ms"
    ))]
    NotCovered { count: usize, earliest_start_ms: i64 },
}

/// Pick the retention policy best suited to answer `queries` at `now`.
///
/// The batch needs data from its earliest raw `start_timestamp_ms` onwards. A finite policy
/// keeps data from `now - duration`, so it covers the batch when its margin
/// `earliest_start - (now - duration)` is non-negative. Among covering policies the smallest
/// margin wins, then the shortest duration, then the name.
///
/// Infinite policies only serve as a fallback when no finite policy covers the batch; among
/// several of them the default one is preferred, then the first by name.
pub fn pick<'a>(
    queries: &[Query],
    policies: &'a PolicySet,
    now: Time,
) -> Result<&'a str, SelectError> {
    let earliest_start_ms = queries
        .iter()
        .map(|q| q.start_timestamp_ms)
        .min()
        .context(NoQueriesSnafu)?;
    ensure!(!policies.is_empty(), NoPoliciesSnafu);

    let now_ms = now.timestamp_millis();
    let mut closest: Option<(i64, Duration, &'a str)> = None;
    let mut fallback: Option<&'a RetentionPolicy> = None;

    for policy in policies.iter() {
        if policy.is_infinite() {
            fallback = match fallback {
                Some(current) if current.default || !policy.default => Some(current),
                _ => Some(policy),
            };
            continue;
        }

        let duration_ms = i64::try_from(policy.duration.as_millis()).unwrap_or(i64::MAX);
        let window_start_ms = now_ms.saturating_sub(duration_ms);
        let margin = earliest_start_ms.saturating_sub(window_start_ms);
        if margin < 0 {
            continue;
        }

        let candidate = (margin, policy.duration, policy.name.as_str());
        if closest.map_or(true, |best| candidate < best) {
            closest = Some(candidate);
        }
    }

    closest
        .map(|(_, _, name)| name)
        .or_else(|| fallback.map(|policy| policy.name.as_str()))
        .context(NotCoveredSnafu {
            count: policies.len(),
            earliest_start_ms,
        })
}
