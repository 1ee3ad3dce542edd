//! Managed key reconciliation engine for keyward.
//!
//! Synchronizes a declared set of managed keys, spread across several
//! provider families, against a remote key-management namespace that keeps
//! one flat collection per family.
//!
//! # Architecture
//!
//! ## Components
//!
//! - **Remote**: the [`RemoteStore`] trait with HTTP and in-memory backends
//! - **Diff**: identity-keyed comparison of two declared snapshots
//! - **Reconciler**: collision guard, ordered Puts, then Deletes
//! - **Drift**: version-token comparison on every read
//! - **Gate**: server-version checks for families the remote may lack
//!
//! ## Reconciliation pass
//!
//! 1. **Validate**: every declared block is checked against its family schema
//! 2. **Guard**: a fresh resource refuses to adopt remote entries it never wrote
//! 3. **Write**: every declared entry is Put, redacted fields included
//! 4. **Delete**: entries that left the declaration are removed
//! 5. **Refresh**: later reads merge remote fields with retained secrets and
//!    report drift
//!
//! # Example
//!
//! ```
//! use keyward_model::TypeRegistry;
//! use keyward_sync::{MemoryKeyStore, Reconciler, ReconcilerConfig};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(TypeRegistry::builtin());
//! let store = Arc::new(MemoryKeyStore::new(TypeRegistry::builtin()));
//! let reconciler = Reconciler::new(store, registry).with_config(ReconcilerConfig {
//!     guard_new_families: true,
//! });
//! assert!(reconciler.config().guard_new_families);
//! ```

pub mod diff;
pub mod drift;
mod error;
pub mod gate;
mod reconciler;
mod refresh;
pub mod remote;

pub use diff::SnapshotDiff;
pub use drift::{DriftNotice, DriftReporter, VersionLedger};
pub use error::{KeyResult, ManagedKeyError, Operation};
pub use gate::{AllFeatures, FeatureGate, ServerVersionGate};
pub use reconciler::{ReconcileReport, Reconciler, ReconcilerConfig};
pub use refresh::ReadOutcome;
pub use remote::{HttpKeyStore, HttpStoreConfig, MemoryKeyStore, RemoteStore, StoreCall};

pub use tokio_util::sync::CancellationToken;
