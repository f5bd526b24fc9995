//! Collector configuration loading.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::collector::{CollectorRegistry, DataCollector};

use super::validation::ConfigError;

/// The ordered collector list, as declared in a YAML file.
///
/// The file is a bare sequence of `{name, command, format?}` records; the
/// declaration order is the execution order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectorsConfig {
    pub collectors: Vec<DataCollector>,
}

impl CollectorsConfig {
    /// Load collectors from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all collector definitions.
    ///
    /// Names must be non-empty and unique: a duplicate name would silently
    /// overwrite another collector's snapshot entry, so it is rejected
    /// here instead.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen_names = HashSet::new();

        for collector in &self.collectors {
            if collector.name.is_empty() {
                return Err(ConfigError::ValidationError(
                    "collector name cannot be empty".to_string(),
                ));
            }
            if !seen_names.insert(&collector.name) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate collector name: '{}'",
                    collector.name
                )));
            }
            if collector.command.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "collector '{}' has an empty command",
                    collector.name
                )));
            }
        }

        Ok(())
    }

    /// Build the shared, read-only registry.
    pub fn into_registry(self) -> Arc<CollectorRegistry> {
        Arc::new(CollectorRegistry::new(self.collectors))
    }
}
