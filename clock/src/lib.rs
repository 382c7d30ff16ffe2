//! A thin wall-clock abstraction.
//!
//! Everything that needs "now" (policy selection, cache expiry, drift metrics) asks a
//! [`TimeProvider`] instead of the system clock so that tests can drive time explicitly with a
//! [`MockProvider`].

use std::{fmt::Debug, ops::Add, sync::Arc, time::Duration};

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;

/// A UTC instant with millisecond-or-better precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(DateTime<Utc>);

impl Time {
    /// The unix epoch.
    pub const UNIX_EPOCH: Self = Self(DateTime::<Utc>::UNIX_EPOCH);

    /// Makes a new `Time` from a unix timestamp in milliseconds.
    ///
    /// Returns `None` if the value is out of the representable range.
    pub fn from_timestamp_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(Self)
    }

    /// Milliseconds since the unix epoch.
    pub fn timestamp_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Returns the duration elapsed from `earlier` to `self`, or `None` if `earlier` is after
    /// `self`.
    pub fn checked_duration_since(&self, earlier: Self) -> Option<Duration> {
        (self.0 - earlier.0).to_std().ok()
    }

    /// Adds `duration`, returning `None` on overflow.
    pub fn checked_add(&self, duration: Duration) -> Option<Self> {
        let duration = chrono::Duration::from_std(duration).ok()?;
        self.0.checked_add_signed(duration).map(Self)
    }

    /// Subtracts `duration`, returning `None` on overflow.
    pub fn checked_sub(&self, duration: Duration) -> Option<Self> {
        let duration = chrono::Duration::from_std(duration).ok()?;
        self.0.checked_sub_signed(duration).map(Self)
    }

    /// RFC3339 rendering with millisecond precision.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }
}

impl Add<Duration> for Time {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        self.checked_add(rhs).expect("overflow adding duration to time")
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_rfc3339())
    }
}

/// Source of the current time.
pub trait TimeProvider: Debug + Send + Sync + 'static {
    /// Returns the current time.
    fn now(&self) -> Time;
}

impl<T: TimeProvider + ?Sized> TimeProvider for Arc<T> {
    fn now(&self) -> Time {
        (**self).now()
    }
}

/// [`TimeProvider`] backed by the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProvider;

impl SystemProvider {
    /// Create a new [`SystemProvider`].
    pub fn new() -> Self {
        Self
    }
}

impl TimeProvider for SystemProvider {
    fn now(&self) -> Time {
        Time(Utc::now())
    }
}

/// [`TimeProvider`] that only moves when told to.
#[derive(Debug)]
pub struct MockProvider {
    now: RwLock<Time>,
}

impl MockProvider {
    /// Create a [`MockProvider`] frozen at `start`.
    pub fn new(start: Time) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Set the current time.
    pub fn set(&self, time: Time) {
        *self.now.write() = time;
    }

    /// Advance the current time by `duration`, returning the new time.
    pub fn inc(&self, duration: Duration) -> Time {
        let mut now = self.now.write();
        *now = *now + duration;
        *now
    }
}

impl TimeProvider for MockProvider {
    fn now(&self) -> Time {
        *self.now.read()
    }
}
