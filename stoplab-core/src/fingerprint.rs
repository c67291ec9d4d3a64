//! Configuration fingerprinting — ties a run to the exact parameters it used.
//!
//! The digest is BLAKE3 over the canonical JSON form of [`EngineConfig`].
//! Struct fields serialize in declaration order, so two equal configurations
//! always produce the same fingerprint regardless of how the TOML was laid out.

use crate::config::EngineConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigFingerprint(pub String);

impl ConfigFingerprint {
    pub fn of(config: &EngineConfig) -> Result<Self, ConfigError> {
        let canonical =
            serde_json::to_string(config).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(Self(blake3::hash(canonical.as_bytes()).to_hex().to_string()))
    }

    /// First 12 hex chars, enough to tell runs apart in log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ConfigFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl EngineConfig {
    pub fn fingerprint(&self) -> Result<ConfigFingerprint, ConfigError> {
        ConfigFingerprint::of(self)
    }
}
