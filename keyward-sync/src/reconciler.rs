//! Reconciler: drives the remote namespace toward a declared snapshot.
//!
//! Per family: collision check for fresh resources, then Put every declared
//! entry, then Delete entries that left the declaration. Calls are strictly
//! sequential and fail fast; a failed pass leaves the remote partially
//! applied and the next pass with the same inputs converges.

use crate::diff::SnapshotDiff;
use crate::drift::{DriftReporter, VersionLedger};
use crate::error::{KeyResult, ManagedKeyError, Operation};
use crate::gate::{AllFeatures, FeatureGate};
use crate::remote::RemoteStore;
use keyward_model::{Family, Snapshot, TypeRegistry};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for the reconciler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Also run the collision check when a family first appears in an
    /// existing resource's declaration, not only for fresh resources.
    pub guard_new_families: bool,
}

/// What one family's pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub family: Family,
    /// Names Put, in order.
    pub written: Vec<String>,
    /// Names deleted, in order.
    pub deleted: Vec<String>,
    /// The remote rejected the family and nothing was requested for it.
    pub skipped_unsupported: bool,
}

impl ReconcileReport {
    fn new(family: Family) -> Self {
        Self {
            family,
            written: Vec::new(),
            deleted: Vec::new(),
            skipped_unsupported: false,
        }
    }
}

/// Runs one remote call unless the pass has been cancelled, abandoning it if
/// cancellation arrives while it is in flight.
pub(crate) async fn guarded<T>(
    cancel: &CancellationToken,
    family: Family,
    operation: Operation,
    call: impl Future<Output = KeyResult<T>>,
) -> KeyResult<T> {
    if cancel.is_cancelled() {
        return Err(ManagedKeyError::Cancelled { family, operation });
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ManagedKeyError::Cancelled { family, operation }),
        result = call => result,
    }
}

/// The managed key reconciliation engine for one logical resource.
pub struct Reconciler {
    pub(crate) store: Arc<dyn RemoteStore>,
    pub(crate) registry: Arc<TypeRegistry>,
    gate: Arc<dyn FeatureGate>,
    config: ReconcilerConfig,
    /// Version tokens seen for this resource's keys.
    pub(crate) ledger: Arc<RwLock<VersionLedger>>,
    pub(crate) drift: DriftReporter,
}

impl Reconciler {
    /// Creates a reconciler with the default config and the `AllFeatures` gate.
    pub fn new(store: Arc<dyn RemoteStore>, registry: Arc<TypeRegistry>) -> Self {
        Self {
            store,
            registry,
            gate: Arc::new(AllFeatures),
            config: ReconcilerConfig::default(),
            ledger: Arc::new(RwLock::new(VersionLedger::new())),
            drift: DriftReporter,
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn FeatureGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Restores a ledger persisted by the caller.
    pub fn with_ledger(mut self, ledger: VersionLedger) -> Self {
        self.ledger = Arc::new(RwLock::new(ledger));
        self
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// A copy of the current version ledger, for the caller to persist.
    pub async fn ledger(&self) -> VersionLedger {
        self.ledger.read().await.clone()
    }

    /// Computes the per-family diff without touching the remote.
    pub fn plan(&self, family: Family, old: &Snapshot, new: &Snapshot) -> SnapshotDiff {
        SnapshotDiff::compute(family, old, new)
    }

    fn needs_collision_check(&self, family: Family, old: &Snapshot, is_fresh: bool) -> bool {
        is_fresh || (self.config.guard_new_families && !old.contains_family(family))
    }

    /// Reconciles one family.
    ///
    /// 1. Fresh resource declaring `family`: List it and refuse with
    ///    `Collision` if the remote has entries this resource never wrote.
    /// 2. Put every declared entry (full field set, ascending name order).
    /// 3. Delete every entry declared in `old` but not in `new`.
    ///
    /// `UnsupportedFamily` is surfaced when `new` declares the family and
    /// swallowed otherwise.
    pub async fn reconcile(
        &self,
        family: Family,
        old: &Snapshot,
        new: &Snapshot,
        is_fresh: bool,
        cancel: &CancellationToken,
    ) -> KeyResult<ReconcileReport> {
        let schema = self.registry.lookup(family)?;
        for block in new.family(family) {
            schema.validate(block)?;
        }

        let requested = new.contains_family(family);
        let mut report = ReconcileReport::new(family);

        if requested && self.needs_collision_check(family, old, is_fresh) {
            let listed = guarded(cancel, family, Operation::List, self.store.list(family)).await?;
            let existing: Vec<String> = {
                let ledger = self.ledger.read().await;
                listed
                    .into_iter()
                    .filter(|name| !ledger.is_owned(family, name))
                    .collect()
            };
            if !existing.is_empty() {
                warn!(
                    "Refusing to manage {} keys: {} already exist remotely",
                    family,
                    existing.len()
                );
                return Err(ManagedKeyError::Collision { family, existing });
            }
        }

        let diff = SnapshotDiff::compute(family, old, new);
        debug!(
            "Reconciling {} via {}: {} added, {} changed, {} kept, {} removed",
            family,
            self.store.backend_name(),
            diff.added.len(),
            diff.changed.len(),
            diff.kept.len(),
            diff.removed.len()
        );

        for block in new.family(family) {
            guarded(
                cancel,
                family,
                Operation::Put,
                self.store.put(family, &block.name, &block.fields),
            )
            .await?;

            // Our own write changes the token; the next read re-records it.
            {
                let mut ledger = self.ledger.write().await;
                ledger.forget(family, &block.name);
                ledger.mark_owned(family, &block.name);
            }
            info!("Wrote {} managed key: {}", family, block.name);
            report.written.push(block.name.clone());
        }

        for name in &diff.removed {
            match guarded(cancel, family, Operation::Delete, self.store.delete(family, name)).await
            {
                Ok(()) => {}
                Err(e) if e.is_unsupported() && !requested => {
                    debug!("Remote does not support {} managed keys, nothing to delete", family);
                    report.skipped_unsupported = true;
                    return Ok(report);
                }
                Err(e) => return Err(e),
            }

            {
                let mut ledger = self.ledger.write().await;
                ledger.forget(family, name);
                ledger.disown(family, name);
            }
            info!("Deleted {} managed key: {}", family, name);
            report.deleted.push(name.clone());
        }

        Ok(report)
    }

    /// Reconciles every registered family present in either snapshot, in
    /// registry order. Stops at the first failing family.
    pub async fn reconcile_all(
        &self,
        old: &Snapshot,
        new: &Snapshot,
        is_fresh: bool,
        cancel: &CancellationToken,
    ) -> KeyResult<Vec<ReconcileReport>> {
        for family in new.families() {
            self.registry.lookup(family)?;
        }

        let mut reports = Vec::new();
        for family in self.registry.families() {
            let requested = new.contains_family(family);
            if !requested && !old.contains_family(family) {
                continue;
            }

            let schema = self.registry.lookup(family)?;
            if !self.gate.is_feature_available(&schema.min_version) {
                if !requested {
                    debug!(
                        "Skipping {}: remote server is older than {}",
                        family, schema.min_version
                    );
                    continue;
                }
                warn!(
                    "{} managed keys are declared but need server version {} or newer",
                    family, schema.min_version
                );
            }

            reports.push(self.reconcile(family, old, new, is_fresh, cancel).await?);
        }

        Ok(reports)
    }
}
