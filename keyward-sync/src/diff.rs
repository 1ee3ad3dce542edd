//! Identity-keyed snapshot differ.
//!
//! Pure and side-effect free. The reconciler never branches on `changed`:
//! every name present in the new snapshot is re-Put. The diff exists for
//! planning output and tests.

use keyward_model::{Family, Snapshot};
use std::collections::BTreeSet;

/// Per-family difference between two declared snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub family: Family,
    /// Present in new, absent from old.
    pub added: BTreeSet<String>,
    /// Present in old, absent from new.
    pub removed: BTreeSet<String>,
    /// Present in both.
    pub kept: BTreeSet<String>,
    /// Subset of `kept` whose non-identity fields differ.
    pub changed: BTreeSet<String>,
}

impl SnapshotDiff {
    pub fn compute(family: Family, old: &Snapshot, new: &Snapshot) -> Self {
        let mut diff = Self {
            family,
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
            kept: BTreeSet::new(),
            changed: BTreeSet::new(),
        };

        for block in new.family(family) {
            match old.get(family, &block.name) {
                Some(previous) => {
                    diff.kept.insert(block.name.clone());
                    if previous.fields != block.fields {
                        diff.changed.insert(block.name.clone());
                    }
                }
                None => {
                    diff.added.insert(block.name.clone());
                }
            }
        }

        for block in old.family(family) {
            if new.get(family, &block.name).is_none() {
                diff.removed.insert(block.name.clone());
            }
        }

        diff
    }

    /// Every name present in the new snapshot, i.e. everything a pass Puts.
    pub fn upserts(&self) -> BTreeSet<&str> {
        self.added
            .iter()
            .chain(self.kept.iter())
            .map(String::as_str)
            .collect()
    }

    /// True when neither names nor field values differ.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}
