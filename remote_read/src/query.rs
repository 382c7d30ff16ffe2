//! Helpers to read the time range of a [`Query`].

use std::time::Duration;

use clock::Time;

use crate::Query;

impl Query {
    /// Start of the data this query needs, in milliseconds.
    ///
    /// Prefers the engine hint (which accounts for lookback and range selectors) when present
    /// and non-zero.
    pub fn effective_start_ms(&self) -> i64 {
        match &self.hints {
            Some(hints) if hints.start_ms != 0 => hints.start_ms,
            _ => self.start_timestamp_ms,
        }
    }

    /// End of the data this query needs, in milliseconds.
    pub fn effective_end_ms(&self) -> i64 {
        match &self.hints {
            Some(hints) if hints.end_ms != 0 => hints.end_ms,
            _ => self.end_timestamp_ms,
        }
    }

    /// The query step, if the engine provided a usable one.
    pub fn step(&self) -> Option<Duration> {
        self.hints
            .as_ref()
            .filter(|hints| hints.step_ms > 0)
            .map(|hints| Duration::from_millis(hints.step_ms as u64))
    }
}

/// Converts a millisecond timestamp into a [`Time`], clamping out-of-range values to the epoch.
pub fn time_from_millis(ms: i64) -> Time {
    Time::from_timestamp_millis(ms).unwrap_or(Time::UNIX_EPOCH)
}
