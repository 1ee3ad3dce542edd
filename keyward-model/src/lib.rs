//! Managed key model for keyward.
//!
//! Defines the types every keyward subsystem depends on:
//! - [`Family`]: the closed set of provider families (PKCS#11 HSM, AWS KMS, Azure Key Vault)
//! - [`FamilySchema`] / [`FieldDescriptor`]: which fields a family accepts, requires, and redacts
//! - [`TypeRegistry`]: the fixed family → schema table, iterated in a stable order
//! - [`ManagedKeyBlock`] / [`Snapshot`]: declared configuration, keyed by `(family, name)`
//! - [`RemoteKeyRecord`]: what the remote namespace returns on read
//!
//! Nothing in this crate performs I/O. The reconciliation engine in
//! `keyward-sync` consumes these types.

mod block;
mod error;
mod family;
mod record;
mod registry;
mod schema;
mod snapshot;

pub use block::{FieldMap, ManagedKeyBlock};
pub use error::{ModelError, ModelResult};
pub use family::Family;
pub use record::RemoteKeyRecord;
pub use registry::TypeRegistry;
pub use schema::{FamilySchema, FieldDescriptor};
pub use snapshot::Snapshot;
