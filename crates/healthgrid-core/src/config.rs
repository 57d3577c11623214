//! aggregator.toml configuration parser.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How `RemoveHealthCheck` cleans up per-instance state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPurge {
    /// Drop an instance entry only when the removed check is the only one it
    /// tracks. Instances tracking other checks keep the stale key.
    #[default]
    TrackedOnly,
    /// Remove the check's key from every instance of the application,
    /// dropping entries that become empty.
    ExactKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Bounded mailbox size of the aggregator task.
    pub mailbox_capacity: usize,
    /// Buffer of the broadcast event bus.
    pub event_buffer: usize,
    pub removal_purge: RemovalPurge,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1024,
            event_buffer: 256,
            removal_purge: RemovalPurge::TrackedOnly,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("mailbox_capacity must be greater than zero")]
    ZeroMailbox,

    #[error("event_buffer must be greater than zero")]
    ZeroEventBuffer,
}

impl AggregatorConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: AggregatorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mailbox_capacity == 0 {
            return Err(ConfigError::ZeroMailbox);
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::ZeroEventBuffer);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_uses_defaults() {
        let config = AggregatorConfig::from_toml_str("").unwrap();
        assert_eq!(config, AggregatorConfig::default());
        assert_eq!(config.removal_purge, RemovalPurge::TrackedOnly);
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
mailbox_capacity = 64
event_buffer = 16
removal_purge = "exact_key"
"#;
        let config = AggregatorConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.mailbox_capacity, 64);
        assert_eq!(config.event_buffer, 16);
        assert_eq!(config.removal_purge, RemovalPurge::ExactKey);
    }

    #[test]
    fn zero_capacities_are_rejected() {
        let err = AggregatorConfig::from_toml_str("mailbox_capacity = 0").unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::ZeroMailbox)
        );

        let config = AggregatorConfig {
            event_buffer: 0,
            ..AggregatorConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroEventBuffer));
    }

    #[test]
    fn unknown_purge_mode_is_an_error() {
        assert!(AggregatorConfig::from_toml_str(r#"removal_purge = "everything""#).is_err());
    }

    #[test]
    fn roundtrip_through_file() {
        let config = AggregatorConfig {
            mailbox_capacity: 8,
            event_buffer: 4,
            removal_purge: RemovalPurge::ExactKey,
        };
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml_string().unwrap().as_bytes())
            .unwrap();

        let loaded = AggregatorConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AggregatorConfig::from_file(&dir.path().join("nope.toml")).is_err());
    }
}
