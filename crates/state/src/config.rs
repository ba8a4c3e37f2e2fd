//! State layer configuration.
//!
//! Every field has a default matching the persisted layout, so an empty
//! file (or no file at all) is a valid configuration.
//!
//! # Example
//!
//! ```toml
//! [collections]
//! machines = "machines"
//! machine_removals = "machine-removals"
//! backup_metadata = "backup-metadata"
//!
//! [removal]
//! dependent_collections = ["instance-data", "machine-constraints"]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StateError};

/// Top-level configuration for the state layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub collections: CollectionNames,
    pub removal: RemovalConfig,
}

/// `[collections]` section: names of the collections the protocols touch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionNames {
    pub machines: String,
    pub machine_removals: String,
    pub backup_metadata: String,
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            machines: "machines".to_string(),
            machine_removals: "machine-removals".to_string(),
            backup_metadata: "backup-metadata".to_string(),
        }
    }
}

/// `[removal]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    /// Collections holding documents keyed by a machine's global key that
    /// are deleted together with the machine.
    pub dependent_collections: Vec<String>,
}

impl StateConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| StateError::Config(e.to_string()))
    }

    /// Read and parse a TOML config file from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StateError::Config(format!("could not read '{}': {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| StateError::Config(format!("could not parse '{}': {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = StateConfig::from_toml_str("").unwrap();
        assert_eq!(config, StateConfig::default());
        assert_eq!(config.collections.machine_removals, "machine-removals");
        assert!(config.removal.dependent_collections.is_empty());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = StateConfig::from_toml_str(
            r#"
            [collections]
            backup_metadata = "backups"

            [removal]
            dependent_collections = ["instance-data"]
            "#,
        )
        .unwrap();
        assert_eq!(config.collections.backup_metadata, "backups");
        assert_eq!(config.collections.machines, "machines");
        assert_eq!(config.removal.dependent_collections, ["instance-data"]);
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = StateConfig::from_toml_str("[collections\nmachines = 1").unwrap_err();
        assert!(matches!(err, StateError::Config(_)), "{err}");
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        std::fs::write(&path, "[collections]\nmachines = \"hosts\"\n").unwrap();
        let config = StateConfig::load(&path).unwrap();
        assert_eq!(config.collections.machines, "hosts");

        let err = StateConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("could not read"), "{err}");
    }
}
