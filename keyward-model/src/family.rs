use crate::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A provider-specific category of managed key.
///
/// Each family has its own field schema and its own flat collection in the
/// remote namespace. The derived ordering is the registry iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    /// Key material held in a local HSM, reached through a PKCS#11 library.
    Pkcs,
    /// AWS KMS key referenced with an access key pair.
    Aws,
    /// Azure Key Vault key referenced with a service principal.
    Azure,
}

impl Family {
    /// Every family, in registry order.
    pub const ALL: [Family; 3] = [Family::Pkcs, Family::Aws, Family::Azure];

    /// The path segment used for this family in the remote namespace.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Family::Pkcs => "pkcs",
            Family::Aws => "aws",
            Family::Azure => "azure",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Family {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pkcs" | "pkcs11" => Ok(Family::Pkcs),
            "aws" | "awskms" => Ok(Family::Aws),
            "azure" | "azurekeyvault" => Ok(Family::Azure),
            other => Err(ModelError::UnknownFamily(other.to_string())),
        }
    }
}
