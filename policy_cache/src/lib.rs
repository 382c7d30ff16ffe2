//! Cache of retention-policy metadata, keyed by database name.
//!
//! # Locking
//!
//! The cache is guarded by two tiers of async locks:
//!
//! * a top-level lock over the database → entry map, held only to insert or remove entries;
//! * one lock per entry, held for the whole of a lookup, including a backend fetch on a miss.
//!
//! The top-level lock is always taken before an entry lock, never the other way around. Lookups
//! for the same database therefore serialize on the entry lock, so only the first of a burst of
//! concurrent lookups goes to the backend while the others wait and find the populated entry.
//! Lookups for different databases never wait on each other's fetch.
//!
//! The [`cleaner`] task periodically evicts entries older than an absolute age limit. A sweep holds
//! the top-level lock and takes each entry lock in turn, so it waits for in-flight fetches.

#![warn(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]

pub mod cleaner;

use std::{collections::HashMap, sync::Arc, time::Duration};

use clock::{Time, TimeProvider};
use observability_deps::tracing::*;
use retention_policy::{Credentials, FetchError, PolicySet, RetentionPolicyFetcher};
use snafu::prelude::*;
use tokio::{select, sync::Mutex};
use tokio_util::sync::CancellationToken;

pub use cleaner::{CleanerConfig, CleanerHandle};

#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum Error {
    #[snafu(display("lookup of retention policies of '{database}' cancelled"))]
    Cancelled { database: String },

    #[snafu(display("{source}"))]
    Fetch { source: FetchError },
}

impl Error {
    /// The caller went away before the lookup completed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result type for [`PolicyCache`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// State of one cached database, guarded by the entry lock.
#[derive(Debug, Default)]
struct EntryState {
    policies: Option<Arc<PolicySet>>,
    /// Set only when a fetch succeeded.
    populated_at: Option<Time>,
}

impl EntryState {
    fn cached(&self) -> Option<&Arc<PolicySet>> {
        self.policies.as_ref().filter(|policies| !policies.is_empty())
    }

    /// Entries that were never populated count as infinitely old.
    fn is_expired(&self, now: Time, expiration_limit: Duration) -> bool {
        match self.populated_at {
            None => true,
            Some(populated_at) => now
                .checked_duration_since(populated_at)
                .is_some_and(|age| age >= expiration_limit),
        }
    }
}

/// Cached retention policies of one database.
#[derive(Debug, Default)]
pub struct CacheEntry {
    state: Mutex<EntryState>,
}

/// Cache of the retention policies of every database seen so far.
#[derive(Debug)]
pub struct PolicyCache {
    entries: Mutex<HashMap<String, Arc<CacheEntry>>>,
    fetcher: Arc<dyn RetentionPolicyFetcher>,
    time_provider: Arc<dyn TimeProvider>,
}

impl PolicyCache {
    /// Create an empty cache that populates itself through `fetcher`.
    pub fn new(
        fetcher: Arc<dyn RetentionPolicyFetcher>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            entries: Default::default(),
            fetcher,
            time_provider,
        }
    }

    /// Get the retention policies of `database`, fetching them with `credentials` on a miss.
    ///
    /// Only a non-empty policy set counts as a hit. Failed fetches are not cached: the next caller
    /// tries again. If `ctx` is cancelled while waiting for a lock or during this caller's own
    /// fetch, [`Error::Cancelled`] is returned and the entry is left as it was.
    pub async fn get(
        &self,
        ctx: &CancellationToken,
        database: &str,
        credentials: &Credentials,
    ) -> Result<Arc<PolicySet>> {
        let entry = select! {
            biased;
            _ = ctx.cancelled() => return CancelledSnafu { database }.fail(),
            entry = self.get_or_create(database) => entry,
        };

        let mut state = select! {
            biased;
            _ = ctx.cancelled() => return CancelledSnafu { database }.fail(),
            state = entry.state.lock() => state,
        };

        if let Some(policies) = state.cached() {
            trace!(%database, "retention policies cache hit");
            return Ok(Arc::clone(policies));
        }

        debug!(%database, "retention policies cache miss");
        let policies = select! {
            biased;
            _ = ctx.cancelled() => return CancelledSnafu { database }.fail(),
            res = self.fetcher.fetch(database, credentials) => res.context(FetchSnafu)?,
        };

        let policies = Arc::new(policies);
        state.policies = Some(Arc::clone(&policies));
        state.populated_at = Some(self.time_provider.now());
        debug!(%database, count = policies.len(), "retention policies cached");

        Ok(policies)
    }

    /// Return the entry of `database`, inserting an empty one if absent.
    async fn get_or_create(&self, database: &str) -> Arc<CacheEntry> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get(database) {
            return Arc::clone(entry);
        }

        let entry = Arc::new(CacheEntry::default());
        entries.insert(database.to_string(), Arc::clone(&entry));
        entry
    }

    /// Evict every entry populated `expiration_limit` ago or earlier, and every entry that was
    /// never populated. Returns the number of evicted entries.
    ///
    /// Holds the top-level lock for the whole pass and waits for each entry lock in turn.
    pub async fn sweep(&self, expiration_limit: Duration) -> usize {
        let mut entries = self.entries.lock().await;

        let snapshot: Vec<_> = entries
            .iter()
            .map(|(database, entry)| (database.clone(), Arc::clone(entry)))
            .collect();

        let mut evicted = 0;
        for (database, entry) in snapshot {
            let state = entry.state.lock().await;
            if state.is_expired(self.time_provider.now(), expiration_limit) {
                entries.remove(&database);
                evicted += 1;
                debug!(
                    %database,
                    populated_at = ?state.populated_at,
                    "evicted retention policies"
                );
            }
        }

        evicted
    }

    /// Number of cached databases, populated or not.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// No database cached.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Whether an entry exists for `database`.
    pub async fn contains(&self, database: &str) -> bool {
        self.entries.lock().await.contains_key(database)
    }
}
