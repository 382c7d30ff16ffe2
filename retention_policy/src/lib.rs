//! Retention-policy metadata of an InfluxDB 1.x database.
//!
//! * [`RetentionPolicy`] / [`PolicySet`]: the parsed metadata of one database.
//! * [`RetentionPolicyFetcher`]: where that metadata comes from, with [`HttpFetcher`] querying
//!   the backend with `SHOW RETENTION POLICIES`.
//! * [`pick`]: chooses the policy whose window fits a query batch most tightly.

#![warn(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]

// Workaround for "unused crate" lint false positives.
#[cfg(test)]
use tokio as _;

mod fetch;
mod parse;
mod select;

use std::{
    collections::BTreeMap,
    fmt::{Debug, Display},
    time::Duration,
};

pub use fetch::{FetchError, HttpFetcher, RetentionPolicyFetcher, USER_AGENT};
pub use parse::{parse_show_retention_policies, ParseError};
pub use reqwest::StatusCode;
pub use select::{pick, SelectError};

/// Metadata of a single retention policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Name, unique within its database.
    pub name: String,
    /// How long data is kept. Zero means forever.
    pub duration: Duration,
    /// Time span covered by each shard group.
    pub shard_group_duration: Duration,
    /// Replication factor.
    pub replica_n: i64,
    /// Whether writes without an explicit policy land here.
    pub default: bool,
}

impl RetentionPolicy {
    /// Data in this policy never expires.
    pub fn is_infinite(&self) -> bool {
        self.duration.is_zero()
    }
}

impl Display for RetentionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let duration = if self.is_infinite() {
            "INF".to_string()
        } else {
            humantime::format_duration(self.duration).to_string()
        };
        write!(
            f,
            "{} (duration: {}, shard group duration: {}, replicas: {}{})",
            self.name,
            duration,
            humantime::format_duration(self.shard_group_duration),
            self.replica_n,
            if self.default { ", default" } else { "" },
        )
    }
}

/// All retention policies of one database, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySet(BTreeMap<String, RetentionPolicy>);

impl PolicySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a policy, replacing any existing policy with the same name.
    pub fn insert(&mut self, policy: RetentionPolicy) {
        self.0.insert(policy.name.clone(), policy);
    }

    /// Look up a policy by name.
    pub fn get(&self, name: &str) -> Option<&RetentionPolicy> {
        self.0.get(name)
    }

    /// Policies in name order.
    pub fn iter(&self) -> impl Iterator<Item = &RetentionPolicy> + '_ {
        self.0.values()
    }

    /// Number of policies.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// No policies at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One policy per line.
impl Display for PolicySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, policy) in self.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{policy}")?;
        }
        Ok(())
    }
}

impl FromIterator<RetentionPolicy> for PolicySet {
    fn from_iter<T: IntoIterator<Item = RetentionPolicy>>(iter: T) -> Self {
        let mut set = Self::new();
        for policy in iter {
            set.insert(policy);
        }
        set
    }
}

/// HTTP Basic credentials forwarded to the backend.
///
/// The password never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password, kept out of logs.
    pub password: String,
}

impl Credentials {
    /// Create new credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The password with every character but the first and last replaced by `*`.
    ///
    /// Passwords of two characters or less are fully masked.
    pub fn masked_password(&self) -> String {
        let chars: Vec<char> = self.password.chars().collect();
        match chars.len() {
            0..=2 => "*".repeat(chars.len()),
            n => {
                let mut masked = String::with_capacity(self.password.len());
                masked.push(chars[0]);
                masked.push_str(&"*".repeat(n - 2));
                masked.push(chars[n - 1]);
                masked
            }
        }
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.masked_password())
            .finish()
    }
}
