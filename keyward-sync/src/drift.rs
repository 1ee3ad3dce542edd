//! Drift detection via remote version tokens.
//!
//! The ledger keeps the last version token seen for each managed key, plus
//! the names this resource has written or adopted. It is owned by the caller
//! and persisted next to the last declared snapshot.

use keyward_model::{Family, RemoteKeyRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::warn;

/// Last known version token per `(family, name)`.
///
/// Also remembers which names this resource put or imported. Those never
/// count as collisions, so a fresh pass that failed halfway can be retried.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionLedger {
    #[serde(default)]
    tokens: BTreeMap<Family, BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    owned: BTreeMap<Family, BTreeSet<String>>,
}

impl VersionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, family: Family, name: &str) -> Option<&str> {
        self.tokens
            .get(&family)
            .and_then(|names| names.get(name))
            .map(String::as_str)
    }

    /// Records a token, returning the one it replaces.
    pub fn record(&mut self, family: Family, name: &str, token: &str) -> Option<String> {
        self.tokens
            .entry(family)
            .or_default()
            .insert(name.to_string(), token.to_string())
    }

    pub fn forget(&mut self, family: Family, name: &str) -> Option<String> {
        let names = self.tokens.get_mut(&family)?;
        let previous = names.remove(name);
        if names.is_empty() {
            self.tokens.remove(&family);
        }
        previous
    }

    pub fn forget_family(&mut self, family: Family) {
        self.tokens.remove(&family);
        self.owned.remove(&family);
    }

    /// Marks `name` as written or adopted by this resource.
    pub fn mark_owned(&mut self, family: Family, name: &str) {
        self.owned.entry(family).or_default().insert(name.to_string());
    }

    pub fn is_owned(&self, family: Family, name: &str) -> bool {
        self.owned
            .get(&family)
            .is_some_and(|names| names.contains(name))
    }

    pub fn disown(&mut self, family: Family, name: &str) -> bool {
        let Some(names) = self.owned.get_mut(&family) else {
            return false;
        };
        let removed = names.remove(name);
        if names.is_empty() {
            self.owned.remove(&family);
        }
        removed
    }

    /// Number of version tokens held.
    pub fn len(&self) -> usize {
        self.tokens.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.owned.is_empty()
    }
}

/// A managed key changed outside this reconciliation path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftNotice {
    pub family: Family,
    pub name: String,
    pub previous: String,
    pub current: String,
}

impl fmt::Display for DriftNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} changed remotely (version {} -> {})",
            self.family, self.name, self.previous, self.current
        )
    }
}

/// Compares remote version tokens against the ledger.
///
/// Never fails and never touches the remote or the declared snapshot. Only
/// the version token is compared; redacted fields are invisible to reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriftReporter;

impl DriftReporter {
    /// Records the record's token and reports drift if a different token was
    /// known before.
    pub fn observe(
        &self,
        ledger: &mut VersionLedger,
        record: &RemoteKeyRecord,
    ) -> Option<DriftNotice> {
        let previous = ledger.record(record.family, &record.name, &record.version_token)?;
        if previous == record.version_token {
            return None;
        }

        let notice = DriftNotice {
            family: record.family,
            name: record.name.clone(),
            previous,
            current: record.version_token.clone(),
        };
        warn!("Managed key drift: {}", notice);
        Some(notice)
    }
}
