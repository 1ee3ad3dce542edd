use crate::{Family, FamilySchema, FieldDescriptor, ModelError, ModelResult};

/// Identity field shared by every built-in family.
const NAME_FIELD: &str = "name";

/// Fixed mapping from family to field schema.
///
/// Populated once at startup and read-only afterwards. Iteration order is the
/// `Family` order, never derived from declared configuration, so that
/// cross-family create/delete ordering is stable.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    schemas: Vec<FamilySchema>,
}

impl TypeRegistry {
    /// The built-in table of managed key families.
    pub fn builtin() -> Self {
        Self::from_schemas(vec![pkcs_schema(), aws_schema(), azure_schema()])
    }

    /// Builds a registry from explicit schemas. Later duplicates of a family
    /// are ignored.
    pub fn from_schemas(schemas: Vec<FamilySchema>) -> Self {
        let mut ordered: Vec<FamilySchema> = Vec::with_capacity(schemas.len());
        for schema in schemas {
            if !ordered.iter().any(|s| s.family == schema.family) {
                ordered.push(schema);
            }
        }
        ordered.sort_by_key(|s| s.family);
        Self { schemas: ordered }
    }

    pub fn lookup(&self, family: Family) -> ModelResult<&FamilySchema> {
        self.schemas
            .iter()
            .find(|s| s.family == family)
            .ok_or(ModelError::UnregisteredFamily(family))
    }

    /// Resolves a family by its textual name (config files, CLI arguments).
    pub fn lookup_name(&self, name: &str) -> ModelResult<&FamilySchema> {
        self.lookup(name.parse()?)
    }

    /// Registered families in iteration order.
    pub fn families(&self) -> Vec<Family> {
        self.schemas.iter().map(|s| s.family).collect()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn key_usage_flags() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::optional("allow_generate_key"),
        FieldDescriptor::optional("allow_replace_key"),
        FieldDescriptor::optional("allow_store_key"),
        FieldDescriptor::optional("any_mount"),
    ]
}

fn pkcs_schema() -> FamilySchema {
    let mut fields = vec![
        FieldDescriptor::required("library"),
        FieldDescriptor::required("mechanism"),
        FieldDescriptor::secret("pin"),
        FieldDescriptor::optional("key_label"),
        FieldDescriptor::optional("key_id"),
        FieldDescriptor::optional("slot"),
        FieldDescriptor::optional("token_label"),
        FieldDescriptor::optional("curve"),
        FieldDescriptor::optional("key_bits"),
        FieldDescriptor::optional("force_rw_session"),
    ];
    fields.extend(key_usage_flags());
    FamilySchema::new(Family::Pkcs, "1.10.0", NAME_FIELD, fields)
}

fn aws_schema() -> FamilySchema {
    let mut fields = vec![
        FieldDescriptor::secret("access_key"),
        FieldDescriptor::secret("secret_key"),
        FieldDescriptor::required("kms_key"),
        FieldDescriptor::required("key_bits"),
        FieldDescriptor::required("key_type"),
        FieldDescriptor::optional("curve"),
        FieldDescriptor::optional("endpoint"),
        FieldDescriptor::optional("region"),
    ];
    fields.extend(key_usage_flags());
    FamilySchema::new(Family::Aws, "1.10.0", NAME_FIELD, fields)
}

fn azure_schema() -> FamilySchema {
    let mut fields = vec![
        FieldDescriptor::required("tenant_id"),
        FieldDescriptor::required("client_id"),
        FieldDescriptor::secret("client_secret"),
        FieldDescriptor::required("vault_name"),
        FieldDescriptor::required("key_name"),
        FieldDescriptor::required("key_bits"),
        FieldDescriptor::required("key_type"),
        FieldDescriptor::optional("environment"),
        FieldDescriptor::optional("resource"),
    ];
    fields.extend(key_usage_flags());
    FamilySchema::new(Family::Azure, "1.11.0", NAME_FIELD, fields)
}
