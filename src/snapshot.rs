//! Snapshot data types.
//!
//! A [`Snapshot`] is the result of one collection cycle against a single
//! host: an identifier (unix timestamp for continuous collection, a
//! user-supplied label for one-shot captures) plus one captured value per
//! collector. Snapshots are complete or absent — a failed cycle never
//! produces a partial snapshot.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a snapshot.
///
/// Serialized untagged: a continuous snapshot identifier is a JSON number
/// (unix timestamp), a named one is a JSON string, so decoding is
/// unambiguous either way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotId {
    /// Unix timestamp, assigned by the scheduler in continuous mode.
    Timestamp(i64),
    /// User-supplied label, assigned in one-shot (named) mode.
    Named(String),
}

impl SnapshotId {
    /// Identifier for a continuous snapshot taken at `ts`.
    pub fn timestamp(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts.timestamp())
    }

    /// Identifier for a named, one-shot snapshot.
    pub fn named(label: impl Into<String>) -> Self {
        Self::Named(label.into())
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timestamp(ts) => write!(f, "{}", ts),
            Self::Named(label) => write!(f, "{}", label),
        }
    }
}

/// One captured collector value.
///
/// Tagged so a decoded snapshot keeps the value's shape: raw command output,
/// a parsed number, or parsed JSON, depending on the collector's declared
/// output format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CollectorValue {
    /// Raw command output, lossily decoded as UTF-8.
    Text(String),
    /// Output parsed as a floating point number.
    Numeric(f64),
    /// Output parsed as a JSON document.
    Structured(serde_json::Value),
}

/// One collection result for a single host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the collection cycle started (UTC).
    pub taken_at: DateTime<Utc>,
    /// Timestamp or label identifying this snapshot.
    pub id: SnapshotId,
    /// Captured value per collector name.
    pub entries: BTreeMap<String, CollectorValue>,
}

impl Snapshot {
    /// Create an empty snapshot with the given identifier.
    pub fn new(id: SnapshotId) -> Self {
        Self {
            taken_at: Utc::now(),
            id,
            entries: BTreeMap::new(),
        }
    }
}
