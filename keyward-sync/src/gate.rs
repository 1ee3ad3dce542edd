//! Feature gating against the remote server version.

use crate::error::{KeyResult, ManagedKeyError};
use semver::{BuildMetadata, Version};
use tracing::warn;

/// Answers whether the remote server is new enough for a capability.
pub trait FeatureGate: Send + Sync {
    fn is_feature_available(&self, min_version: &str) -> bool;
}

/// Gate that reports every feature as available.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllFeatures;

impl FeatureGate for AllFeatures {
    fn is_feature_available(&self, _min_version: &str) -> bool {
        true
    }
}

/// Gate backed by the version string the remote server reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerVersionGate {
    version: Version,
}

fn parse_version(raw: &str) -> Result<Version, semver::Error> {
    let mut version = Version::parse(raw.trim().trim_start_matches('v'))?;
    // Build metadata ("+ent") says nothing about capabilities.
    version.build = BuildMetadata::EMPTY;
    Ok(version)
}

impl ServerVersionGate {
    pub fn parse(server_version: &str) -> KeyResult<Self> {
        let version = parse_version(server_version).map_err(|e| {
            ManagedKeyError::Config(format!("invalid server version '{server_version}': {e}"))
        })?;
        Ok(Self { version })
    }

    pub fn version(&self) -> &Version {
        &self.version
    }
}

impl FeatureGate for ServerVersionGate {
    fn is_feature_available(&self, min_version: &str) -> bool {
        match parse_version(min_version) {
            Ok(min) => self.version >= min,
            Err(e) => {
                warn!("Ignoring feature with unparseable minimum version '{}': {}", min_version, e);
                false
            }
        }
    }
}
