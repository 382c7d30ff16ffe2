//! Background eviction of expired cache entries.

use std::{sync::Arc, time::Duration};

use humantime::format_duration;
use observability_deps::tracing::*;
use tokio::{
    select,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::PolicyCache;

/// Schedule of the cleaner task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanerConfig {
    /// Time between two sweeps. Must not be zero.
    pub check_frequency: Duration,
    /// Age at which an entry is evicted.
    pub expiration_limit: Duration,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            check_frequency: Duration::from_secs(60 * 60),
            expiration_limit: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Handle to the running cleaner task.
#[derive(Debug)]
pub struct CleanerHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl CleanerHandle {
    /// Stop the cleaner and wait for its task to finish.
    ///
    /// A sweep in progress is abandoned.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            error!(%e, "retention policies cleaner task failed");
        }
    }
}

impl PolicyCache {
    /// Start a task that [sweeps](Self::sweep) the cache every
    /// [`check_frequency`](CleanerConfig::check_frequency), evicting entries older than
    /// [`expiration_limit`](CleanerConfig::expiration_limit).
    ///
    /// The first sweep happens one period after the start.
    ///
    /// # Panics
    ///
    /// Panics if the check frequency is zero.
    pub fn start_cleaner(self: &Arc<Self>, config: CleanerConfig) -> CleanerHandle {
        assert!(
            !config.check_frequency.is_zero(),
            "cleaner check frequency must be positive"
        );

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(perform(
            Arc::clone(self),
            shutdown.clone(),
            config.check_frequency,
            config.expiration_limit,
        ));

        CleanerHandle { shutdown, task }
    }
}

async fn perform(
    cache: Arc<PolicyCache>,
    shutdown: CancellationToken,
    check_frequency: Duration,
    expiration_limit: Duration,
) {
    info!(
        check_frequency = %format_duration(check_frequency),
        expiration_limit = %format_duration(expiration_limit),
        "retention policies cleaner starting"
    );

    let mut ticker = interval_at(Instant::now() + check_frequency, check_frequency);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => (),
        }

        select! {
            _ = shutdown.cancelled() => break,
            evicted = cache.sweep(expiration_limit) => {
                if evicted > 0 {
                    info!(evicted, "expired retention policies evicted");
                } else {
                    debug!("no expired retention policies");
                }
            }
        }
    }

    info!("retention policies cleaner stopped");
}
