use crate::{Family, FieldMap, ManagedKeyBlock, ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A declared set of managed keys, partitioned by family.
///
/// Names are unique within a family. A family with no blocks is not stored,
/// so `contains_family` means "at least one block of that family is declared".
///
/// Serialized form groups blocks per family, with the identity inline:
///
/// ```json
/// { "pkcs": [ { "name": "hsm-1", "library": "softhsm", "mechanism": "0x0001", "pin": "1234" } ] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SnapshotRepr", into = "SnapshotRepr")]
pub struct Snapshot {
    families: BTreeMap<Family, BTreeMap<String, ManagedKeyBlock>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot, rejecting duplicate `(family, name)` pairs.
    pub fn from_blocks(blocks: impl IntoIterator<Item = ManagedKeyBlock>) -> ModelResult<Self> {
        let mut snapshot = Self::new();
        for block in blocks {
            snapshot.insert(block)?;
        }
        Ok(snapshot)
    }

    /// Adds a block. Fails if the family already declares that name.
    pub fn insert(&mut self, block: ManagedKeyBlock) -> ModelResult<()> {
        let entries = self.families.entry(block.family).or_default();
        if entries.contains_key(&block.name) {
            return Err(ModelError::DuplicateName {
                family: block.family,
                name: block.name,
            });
        }
        entries.insert(block.name.clone(), block);
        Ok(())
    }

    /// Adds or replaces a block.
    pub fn upsert(&mut self, block: ManagedKeyBlock) -> Option<ManagedKeyBlock> {
        self.families
            .entry(block.family)
            .or_default()
            .insert(block.name.clone(), block)
    }

    pub fn remove(&mut self, family: Family, name: &str) -> Option<ManagedKeyBlock> {
        let entries = self.families.get_mut(&family)?;
        let removed = entries.remove(name);
        if entries.is_empty() {
            self.families.remove(&family);
        }
        removed
    }

    pub fn get(&self, family: Family, name: &str) -> Option<&ManagedKeyBlock> {
        self.families.get(&family).and_then(|e| e.get(name))
    }

    pub fn contains_family(&self, family: Family) -> bool {
        self.families.contains_key(&family)
    }

    /// Blocks of one family, ordered by name.
    pub fn family(&self, family: Family) -> impl Iterator<Item = &ManagedKeyBlock> {
        self.families.get(&family).into_iter().flat_map(|e| e.values())
    }

    /// Names of one family, ordered.
    pub fn names(&self, family: Family) -> Vec<&str> {
        self.family(family).map(|b| b.name.as_str()).collect()
    }

    /// Families with at least one declared block.
    pub fn families(&self) -> impl Iterator<Item = Family> + '_ {
        self.families.keys().copied()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &ManagedKeyBlock> {
        self.families.values().flat_map(|e| e.values())
    }

    pub fn len(&self) -> usize {
        self.families.values().map(|e| e.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(transparent)]
struct SnapshotRepr(BTreeMap<Family, Vec<FieldMap>>);

const NAME_KEY: &str = "name";

impl TryFrom<SnapshotRepr> for Snapshot {
    type Error = ModelError;

    fn try_from(repr: SnapshotRepr) -> Result<Self, Self::Error> {
        let mut snapshot = Snapshot::new();
        for (family, entries) in repr.0 {
            for mut fields in entries {
                let name = match fields.remove(NAME_KEY) {
                    Some(serde_json::Value::String(name)) if !name.trim().is_empty() => name,
                    _ => return Err(ModelError::EmptyName { family }),
                };
                snapshot.insert(ManagedKeyBlock {
                    family,
                    name,
                    fields,
                })?;
            }
        }
        Ok(snapshot)
    }
}

impl From<Snapshot> for SnapshotRepr {
    fn from(snapshot: Snapshot) -> Self {
        let mut repr = BTreeMap::new();
        for (family, entries) in snapshot.families {
            let list: Vec<FieldMap> = entries
                .into_values()
                .map(|block| {
                    let mut fields = block.fields;
                    fields.insert(NAME_KEY.to_string(), serde_json::Value::String(block.name));
                    fields
                })
                .collect();
            repr.insert(family, list);
        }
        SnapshotRepr(repr)
    }
}
