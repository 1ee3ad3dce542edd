//! Remote store abstraction trait.

use crate::error::KeyResult;
use async_trait::async_trait;
use keyward_model::{Family, FieldMap, RemoteKeyRecord};

/// Abstract managed key namespace.
///
/// No transactional or batch semantics: each call stands alone. Errors
/// distinguish absence (`NotFound`), an unknown family (`UnsupportedFamily`)
/// and everything else (`Transport`).
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Returns the name of the backend, for logs.
    fn backend_name(&self) -> &'static str;

    /// Creates or replaces an entry. Redacted fields are sent too.
    async fn put(&self, family: Family, name: &str, fields: &FieldMap) -> KeyResult<()>;

    /// Lists entry names of a family. An empty family is an empty list.
    async fn list(&self, family: Family) -> KeyResult<Vec<String>>;

    /// Reads an entry. Redacted fields are never present in the result.
    async fn get(&self, family: Family, name: &str) -> KeyResult<RemoteKeyRecord>;

    /// Removes an entry. Removing an absent entry succeeds.
    async fn delete(&self, family: Family, name: &str) -> KeyResult<()>;
}
