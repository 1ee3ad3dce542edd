use crate::{Family, FieldMap, ManagedKeyBlock, ModelError, ModelResult};
use serde::{Deserialize, Serialize};

/// Describes one field a managed key family accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub key: String,
    /// The field must be present (and non-null) in every declared block.
    pub required: bool,
    /// Accepted on write, never returned by a remote read.
    pub redacted: bool,
    /// The field that names an entry within its family.
    pub identity: bool,
}

impl FieldDescriptor {
    fn plain(key: &str, required: bool, redacted: bool) -> Self {
        Self {
            key: key.into(),
            required,
            redacted,
            identity: false,
        }
    }

    /// Shorthand for the identity field. Only `FamilySchema::new` creates one,
    /// so every schema has exactly one identity.
    pub(crate) fn identity(key: &str) -> Self {
        Self {
            key: key.into(),
            required: true,
            redacted: false,
            identity: true,
        }
    }

    /// Shorthand for a required field that the remote echoes back.
    pub fn required(key: &str) -> Self {
        Self::plain(key, true, false)
    }

    /// Shorthand for an optional field that the remote echoes back.
    pub fn optional(key: &str) -> Self {
        Self::plain(key, false, false)
    }

    /// Shorthand for a required write-only field (credentials, PINs).
    pub fn secret(key: &str) -> Self {
        Self::plain(key, true, true)
    }

    /// Shorthand for an optional write-only field.
    pub fn optional_secret(key: &str) -> Self {
        Self::plain(key, false, true)
    }
}

/// Field schema of one managed key family.
///
/// Deserialization goes through the same checks as [`FamilySchema::new`]: a
/// schema with no identity field, or more than one, is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SchemaRepr", into = "SchemaRepr")]
pub struct FamilySchema {
    pub family: Family,
    /// Oldest remote server version that supports this family.
    pub min_version: String,
    identity: FieldDescriptor,
    /// Every field, identity first.
    fields: Vec<FieldDescriptor>,
}

#[derive(Serialize, Deserialize)]
struct SchemaRepr {
    family: Family,
    min_version: String,
    fields: Vec<FieldDescriptor>,
}

impl TryFrom<SchemaRepr> for FamilySchema {
    type Error = ModelError;

    fn try_from(repr: SchemaRepr) -> Result<Self, Self::Error> {
        let (identities, others): (Vec<_>, Vec<_>) =
            repr.fields.into_iter().partition(|f| f.identity);
        let identity = match <[FieldDescriptor; 1]>::try_from(identities) {
            Ok([identity]) => identity,
            Err(found) => {
                return Err(ModelError::InvalidSchema {
                    family: repr.family,
                    reason: format!("expected one identity field, found {}", found.len()),
                });
            }
        };
        if others.iter().any(|f| f.key == identity.key) {
            return Err(ModelError::InvalidSchema {
                family: repr.family,
                reason: format!("identity field '{}' is declared twice", identity.key),
            });
        }
        Ok(Self::assemble(repr.family, repr.min_version, identity, others))
    }
}

impl From<FamilySchema> for SchemaRepr {
    fn from(schema: FamilySchema) -> Self {
        Self {
            family: schema.family,
            min_version: schema.min_version,
            fields: schema.fields,
        }
    }
}

impl FamilySchema {
    /// Builds a schema whose identity field is `identity_key`, followed by `fields`.
    ///
    /// Any descriptor in `fields` that reuses the identity key is dropped.
    pub fn new(
        family: Family,
        min_version: impl Into<String>,
        identity_key: &str,
        fields: Vec<FieldDescriptor>,
    ) -> Self {
        let others = fields
            .into_iter()
            .filter(|f| f.key != identity_key && !f.identity)
            .collect();
        Self::assemble(
            family,
            min_version.into(),
            FieldDescriptor::identity(identity_key),
            others,
        )
    }

    fn assemble(
        family: Family,
        min_version: String,
        identity: FieldDescriptor,
        others: Vec<FieldDescriptor>,
    ) -> Self {
        let mut fields = Vec::with_capacity(others.len() + 1);
        fields.push(identity.clone());
        fields.extend(others);
        Self {
            family,
            min_version,
            identity,
            fields,
        }
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// The identity descriptor. Always the first entry of [`fields`](Self::fields).
    pub fn identity(&self) -> &FieldDescriptor {
        &self.identity
    }

    pub fn is_redacted(&self, key: &str) -> bool {
        self.field(key).is_some_and(|f| f.redacted)
    }

    pub fn redacted_keys(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.redacted)
            .map(|f| f.key.as_str())
    }

    pub fn required_keys(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.required && !f.identity)
            .map(|f| f.key.as_str())
    }

    /// Checks a declared block against this schema.
    ///
    /// Rejects empty names, an identity repeated inside `fields`, fields the
    /// family does not know, and required fields that are absent or null.
    pub fn validate(&self, block: &ManagedKeyBlock) -> ModelResult<()> {
        if block.name.trim().is_empty() {
            return Err(ModelError::EmptyName {
                family: self.family,
            });
        }

        let identity = &self.identity().key;
        for key in block.fields.keys() {
            if key == identity {
                return Err(ModelError::IdentityInFields {
                    family: self.family,
                    name: block.name.clone(),
                    field: key.clone(),
                });
            }
            if self.field(key).is_none() {
                return Err(ModelError::UnknownField {
                    family: self.family,
                    name: block.name.clone(),
                    field: key.clone(),
                });
            }
        }

        for key in self.required_keys() {
            let present = block.fields.get(key).is_some_and(|v| !v.is_null());
            if !present {
                return Err(ModelError::MissingField {
                    family: self.family,
                    name: block.name.clone(),
                    field: key.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Returns the fields a remote read would expose: redacted and identity
    /// keys removed.
    pub fn strip_redacted(&self, fields: &FieldMap) -> FieldMap {
        fields
            .iter()
            .filter(|(k, _)| !self.is_redacted(k) && *k != &self.identity().key)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Rebuilds declared fields from a remote read.
    ///
    /// Non-redacted schema fields come from `remote`; keys the schema does not
    /// know are dropped. Redacted fields come only from `declared`, never from
    /// the remote response.
    pub fn merge_remote(&self, remote: &FieldMap, declared: Option<&FieldMap>) -> FieldMap {
        let mut merged = FieldMap::new();
        for field in self.fields.iter().filter(|f| !f.identity) {
            let value = if field.redacted {
                declared.and_then(|d| d.get(&field.key))
            } else {
                remote.get(&field.key)
            };
            if let Some(value) = value {
                merged.insert(field.key.clone(), value.clone());
            }
        }
        merged
    }
}
