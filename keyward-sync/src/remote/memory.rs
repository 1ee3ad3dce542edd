//! In-process managed key store.
//!
//! Behaves like the remote namespace: redacted fields are accepted on write
//! and stripped on read, and every mutation assigns a new version token. It
//! can also simulate out-of-band edits, unsupported families and one-shot
//! failures, and records every call it receives.

use super::store::RemoteStore;
use crate::error::{KeyResult, ManagedKeyError, Operation};
use async_trait::async_trait;
use keyward_model::{Family, FieldMap, RemoteKeyRecord, TypeRegistry};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// One call received by a [`MemoryKeyStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub operation: Operation,
    pub family: Family,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredKey {
    fields: FieldMap,
    version: String,
}

#[derive(Debug)]
struct Fault {
    operation: Operation,
    family: Family,
    name: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<(Family, String), StoredKey>,
    unsupported: BTreeSet<Family>,
    faults: Vec<Fault>,
    calls: Vec<StoreCall>,
}

/// Managed key store held in memory.
pub struct MemoryKeyStore {
    registry: TypeRegistry,
    state: Mutex<MemoryState>,
}

impl MemoryKeyStore {
    pub fn new(registry: TypeRegistry) -> Self {
        Self {
            registry,
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Writes an entry without going through the store API, as another
    /// operator would. Returns the new version token.
    pub fn seed(&self, family: Family, name: &str, fields: FieldMap) -> String {
        let version = Uuid::new_v4().to_string();
        self.state().records.insert(
            (family, name.to_string()),
            StoredKey {
                fields,
                version: version.clone(),
            },
        );
        version
    }

    /// Removes an entry without going through the store API.
    pub fn evict(&self, family: Family, name: &str) -> bool {
        self.state()
            .records
            .remove(&(family, name.to_string()))
            .is_some()
    }

    pub fn contains(&self, family: Family, name: &str) -> bool {
        self.state()
            .records
            .contains_key(&(family, name.to_string()))
    }

    /// Everything last written for an entry, redacted fields included.
    pub fn stored_fields(&self, family: Family, name: &str) -> Option<FieldMap> {
        self.state()
            .records
            .get(&(family, name.to_string()))
            .map(|k| k.fields.clone())
    }

    /// Current version token of an entry.
    pub fn version(&self, family: Family, name: &str) -> Option<String> {
        self.state()
            .records
            .get(&(family, name.to_string()))
            .map(|k| k.version.clone())
    }

    /// Entry names of a family, ordered.
    pub fn names(&self, family: Family) -> Vec<String> {
        self.state()
            .records
            .keys()
            .filter(|(f, _)| *f == family)
            .map(|(_, n)| n.clone())
            .collect()
    }

    /// Makes every call for `family` fail as an unknown type.
    pub fn mark_unsupported(&self, family: Family) {
        self.state().unsupported.insert(family);
    }

    /// Makes the next matching call fail with a transport error.
    /// `name: None` matches any entry of the family.
    pub fn fail_next(&self, operation: Operation, family: Family, name: Option<&str>) {
        self.state().faults.push(Fault {
            operation,
            family,
            name: name.map(str::to_string),
        });
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    /// Calls of one operation, in order.
    pub fn calls_of(&self, operation: Operation) -> Vec<StoreCall> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Logs the call, then applies simulated failures.
    fn admit(&self, operation: Operation, family: Family, name: Option<&str>) -> KeyResult<()> {
        let mut state = self.state();
        state.calls.push(StoreCall {
            operation,
            family,
            name: name.map(str::to_string),
        });

        if state.unsupported.contains(&family) {
            return Err(ManagedKeyError::UnsupportedFamily {
                family,
                operation,
                detail: format!("unsupported managed key type: {family}"),
            });
        }

        let fault = state.faults.iter().position(|f| {
            f.operation == operation
                && f.family == family
                && (f.name.is_none() || f.name.as_deref() == name)
        });
        if let Some(index) = fault {
            state.faults.remove(index);
            return Err(ManagedKeyError::transport(
                family,
                operation,
                name,
                "injected failure",
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryKeyStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, family: Family, name: &str, fields: &FieldMap) -> KeyResult<()> {
        self.admit(Operation::Put, family, Some(name))?;
        let version = self.seed(family, name, fields.clone());
        debug!("memory store wrote {}/{} (version {})", family, name, version);
        Ok(())
    }

    async fn list(&self, family: Family) -> KeyResult<Vec<String>> {
        self.admit(Operation::List, family, None)?;
        Ok(self.names(family))
    }

    async fn get(&self, family: Family, name: &str) -> KeyResult<RemoteKeyRecord> {
        self.admit(Operation::Get, family, Some(name))?;

        let stored = self
            .state()
            .records
            .get(&(family, name.to_string()))
            .cloned()
            .ok_or_else(|| ManagedKeyError::NotFound {
                family,
                name: name.to_string(),
            })?;

        let fields = match self.registry.lookup(family) {
            Ok(schema) => schema.strip_redacted(&stored.fields),
            Err(_) => stored.fields,
        };

        Ok(RemoteKeyRecord {
            family,
            name: name.to_string(),
            fields,
            version_token: stored.version,
        })
    }

    async fn delete(&self, family: Family, name: &str) -> KeyResult<()> {
        self.admit(Operation::Delete, family, Some(name))?;
        self.evict(family, name);
        Ok(())
    }
}
