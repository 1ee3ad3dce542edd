use crate::{Family, FieldMap};
use serde::{Deserialize, Serialize};

/// A managed key as returned by a remote read.
///
/// `fields` never contains redacted values. `version_token` is opaque and
/// changes whenever the remote object is mutated, by anyone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteKeyRecord {
    pub family: Family,
    pub name: String,
    pub fields: FieldMap,
    pub version_token: String,
}
