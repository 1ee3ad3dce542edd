//! Configuration, state persistence and command drivers for the keyward CLI.
//!
//! The binary is a thin shell over these functions: it loads a
//! [`KeywardConfig`] and the last applied [`StateFile`], builds a
//! [`Reconciler`], and hands both to [`plan`], [`apply`], [`refresh`] or
//! [`import`].

use anyhow::{Context, Result};
use keyward_model::{Family, Snapshot, TypeRegistry};
use keyward_sync::{
    AllFeatures, CancellationToken, DriftNotice, FeatureGate, HttpStoreConfig, ReconcileReport,
    Reconciler, ReconcilerConfig, RemoteStore, ServerVersionGate, SnapshotDiff, VersionLedger,
};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Environment variable that overrides `remote.token` from the config file.
pub const TOKEN_ENV: &str = "KEYWARD_TOKEN";

/// Contents of the `--config` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywardConfig {
    pub remote: HttpStoreConfig,
    /// Version the remote server reports. Families newer than this are
    /// skipped when nothing declares them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    pub guard_new_families: bool,
}

impl KeywardConfig {
    /// Reads the config file, then applies the `KEYWARD_TOKEN` override.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config.with_token_override(std::env::var(TOKEN_ENV).ok()))
    }

    /// Replaces the configured token with `token` when it is non-blank.
    pub fn with_token_override(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.remote.token = Some(token);
        }
        self
    }

    pub fn gate(&self) -> Result<Arc<dyn FeatureGate>> {
        match &self.server_version {
            Some(version) => Ok(Arc::new(ServerVersionGate::parse(version)?)),
            None => Ok(Arc::new(AllFeatures)),
        }
    }

    /// Builds a reconciler over `store`, seeded with the persisted ledger.
    pub fn reconciler(
        &self,
        store: Arc<dyn RemoteStore>,
        ledger: VersionLedger,
    ) -> Result<Reconciler> {
        Ok(Reconciler::new(store, Arc::new(TypeRegistry::builtin()))
            .with_gate(self.gate()?)
            .with_config(ReconcilerConfig {
                guard_new_families: self.guard_new_families,
            })
            .with_ledger(ledger))
    }
}

/// Last applied declaration plus the version tokens seen for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(default)]
    pub declared: Snapshot,
    #[serde(default)]
    pub versions: VersionLedger,
}

impl StateFile {
    /// Loads saved state. `None` means nothing has been applied yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            debug!("No state at {}, treating resource as fresh", path.display());
            return Ok(None);
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file {}", path.display()))?;
        let state = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse state file {}", path.display()))?;
        Ok(Some(state))
    }

    /// Writes the state next to its final path, then renames it into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize state")?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write state file {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move state file into {}", path.display()))?;
        Ok(())
    }
}

/// Reads a declared snapshot file.
pub fn load_declared(path: &Path) -> Result<Snapshot> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read declared keys {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid declared keys in {}", path.display()))
}

pub fn save_declared(snapshot: &Snapshot, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot).context("Failed to serialize keys")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Diffs `declared` against the saved state for every family either side has.
pub fn plan(
    registry: &TypeRegistry,
    state: Option<&StateFile>,
    declared: &Snapshot,
) -> Vec<SnapshotDiff> {
    let empty = Snapshot::new();
    let old = state.map_or(&empty, |s| &s.declared);
    registry
        .families()
        .into_iter()
        .filter(|&f| old.contains_family(f) || declared.contains_family(f))
        .map(|f| SnapshotDiff::compute(f, old, declared))
        .collect()
}

/// Human-readable plan: `+` added, `~` changed, `-` removed.
pub fn render_plan(diffs: &[SnapshotDiff]) -> String {
    let mut out = String::new();
    for diff in diffs.iter().filter(|d| !d.is_noop()) {
        let _ = writeln!(out, "{}:", diff.family);
        for name in &diff.added {
            let _ = writeln!(out, "  + {name}");
        }
        for name in &diff.changed {
            let _ = writeln!(out, "  ~ {name}");
        }
        for name in &diff.removed {
            let _ = writeln!(out, "  - {name}");
        }
    }
    if out.is_empty() {
        out.push_str("No changes.\n");
    }
    out
}

/// What [`apply`] did. `state` is worth saving even when `result` failed.
#[derive(Debug)]
pub struct ApplyOutcome {
    pub state: StateFile,
    pub result: Result<Vec<ReconcileReport>>,
}

/// Reconciles the remote toward `declared`.
///
/// A resource with nothing declared yet is fresh, which enables the
/// collision guard. On failure the returned state keeps the old declaration
/// but carries the ledger, so names written before the failure are known as
/// this resource's own and a retry with the same inputs does not collide
/// with them.
pub async fn apply(
    reconciler: &Reconciler,
    state: Option<&StateFile>,
    declared: Snapshot,
    cancel: &CancellationToken,
) -> ApplyOutcome {
    let empty = Snapshot::new();
    let old = state.map_or(&empty, |s| &s.declared);
    let is_fresh = old.is_empty();

    match reconciler.reconcile_all(old, &declared, is_fresh, cancel).await {
        Ok(reports) => {
            info!(
                "Applied {} managed keys across {} families",
                declared.len(),
                reports.len()
            );
            ApplyOutcome {
                state: StateFile {
                    declared,
                    versions: reconciler.ledger().await,
                },
                result: Ok(reports),
            }
        }
        Err(e) => {
            warn!("Apply stopped: {}", e);
            ApplyOutcome {
                state: StateFile {
                    declared: old.clone(),
                    versions: reconciler.ledger().await,
                },
                result: Err(e.into()),
            }
        }
    }
}

/// What [`refresh`] found.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshSummary {
    pub state: StateFile,
    pub drift: Vec<DriftNotice>,
    pub missing: Vec<(Family, String)>,
}

/// Re-reads every declared key and returns the refreshed state.
pub async fn refresh(
    reconciler: &Reconciler,
    state: &StateFile,
    cancel: &CancellationToken,
) -> Result<RefreshSummary> {
    let families: Vec<Family> = state.declared.families().collect();
    let outcome = reconciler
        .read_all(&families, &state.declared, cancel)
        .await?;

    let drift = outcome.drift.clone();
    let missing = outcome.missing.clone();
    let declared = outcome.into_snapshot()?;

    Ok(RefreshSummary {
        state: StateFile {
            declared,
            versions: reconciler.ledger().await,
        },
        drift,
        missing,
    })
}

/// What [`import`] found.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSummary {
    pub imported: Snapshot,
    pub state: StateFile,
    pub drift: Vec<DriftNotice>,
}

/// Imports remote entries and folds the ones the state lacks into it.
///
/// Entries already in the state keep their declared fields, secrets
/// included. Tracked entries whose version moved are reported as drift.
pub async fn import(
    reconciler: &Reconciler,
    state: Option<&StateFile>,
    families: &[Family],
    cancel: &CancellationToken,
) -> Result<ImportSummary> {
    let outcome = reconciler.import(families, cancel).await?;
    let drift = outcome.drift.clone();
    let imported = outcome.into_snapshot()?;

    let mut declared = state.map(|s| s.declared.clone()).unwrap_or_default();
    let mut adopted = 0usize;
    for block in imported.blocks() {
        if declared.get(block.family, &block.name).is_none() {
            declared.upsert(block.clone());
            adopted += 1;
        }
    }
    info!("Adopted {} imported managed keys into state", adopted);

    Ok(ImportSummary {
        imported,
        state: StateFile {
            declared,
            versions: reconciler.ledger().await,
        },
        drift,
    })
}
