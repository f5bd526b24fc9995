//! Collector definitions and the shared registry.
//!
//! A [`DataCollector`] names one remote shell command and declares how its
//! output should be captured. The [`CollectorRegistry`] is the ordered,
//! read-only set of collectors shared by every host worker; execution order
//! is declaration order.

use serde::{Deserialize, Serialize};

use crate::snapshot::CollectorValue;

/// How a collector's raw output is turned into a [`CollectorValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Keep the raw output as text (default).
    #[default]
    Text,
    /// Parse the output as a floating point number.
    Numeric,
    /// Parse the output as a JSON document.
    Json,
}

impl OutputFormat {
    /// Convert captured command output into a typed value.
    ///
    /// # Errors
    /// Returns a message describing why the output did not match the
    /// declared format.
    pub fn parse(self, output: &[u8]) -> Result<CollectorValue, String> {
        match self {
            Self::Text => Ok(CollectorValue::Text(
                String::from_utf8_lossy(output).into_owned(),
            )),
            Self::Numeric => {
                let text = String::from_utf8_lossy(output);
                let trimmed = text.trim();
                trimmed
                    .parse::<f64>()
                    .map(CollectorValue::Numeric)
                    .map_err(|e| format!("not a number ('{}'): {}", trimmed, e))
            }
            Self::Json => serde_json::from_slice(output)
                .map(CollectorValue::Structured)
                .map_err(|e| format!("invalid JSON: {}", e)),
        }
    }
}

/// A named remote probe: one shell command contributing one snapshot entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataCollector {
    /// Unique key for this collector; also the snapshot entry key.
    pub name: String,
    /// Remote shell command to execute.
    pub command: String,
    /// Output capture format (default: text).
    #[serde(default)]
    pub format: OutputFormat,
}

impl DataCollector {
    /// Create a text-format collector.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            format: OutputFormat::Text,
        }
    }

    /// Set the output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }
}

/// Ordered, immutable collector set shared across all host workers.
#[derive(Debug, Default)]
pub struct CollectorRegistry {
    collectors: Vec<DataCollector>,
}

impl CollectorRegistry {
    /// Build a registry from an ordered collector list.
    ///
    /// The list is taken as-is; name validation happens when the
    /// configuration is loaded (see [`crate::config::CollectorsConfig`]).
    pub fn new(collectors: Vec<DataCollector>) -> Self {
        Self { collectors }
    }

    /// Iterate collectors in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &DataCollector> {
        self.collectors.iter()
    }

    /// Number of registered collectors.
    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}
