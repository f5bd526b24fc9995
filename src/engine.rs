//! Collection engine.
//!
//! Runs every registered collector against a live session, in declaration
//! order, and assembles the results into a [`Snapshot`]. The policy is
//! fail-fast: the first collector failure aborts the whole cycle and no
//! snapshot is produced, so a snapshot on disk is always complete.

use std::time::Duration;

use thiserror::Error;

use crate::collector::CollectorRegistry;
use crate::session::{CommandError, CommandErrorKind, RemoteSession};
use crate::snapshot::{Snapshot, SnapshotId};

/// Default per-command timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// A failed collection cycle, naming the collector that aborted it.
#[derive(Debug, Error)]
pub enum CollectError {
    /// The collector's remote command failed or timed out.
    #[error("collector '{collector}' failed: {source}")]
    Command {
        collector: String,
        #[source]
        source: CommandError,
    },

    /// The command succeeded but its output did not match the collector's
    /// declared format.
    #[error("collector '{collector}' produced unparsable output: {message}")]
    Parse { collector: String, message: String },
}

impl CollectError {
    /// Name of the collector that aborted the cycle.
    pub fn collector(&self) -> &str {
        match self {
            Self::Command { collector, .. } | Self::Parse { collector, .. } => collector,
        }
    }
}

/// Drives one collection cycle over a session.
#[derive(Debug, Clone)]
pub struct CollectionEngine {
    command_timeout: Duration,
}

impl CollectionEngine {
    /// Create an engine with the given per-command timeout.
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }

    /// Run every collector in the registry and assemble a snapshot.
    ///
    /// An empty registry yields a snapshot carrying only its identifier.
    /// A command that exceeds the per-command timeout counts as that
    /// collector's failure; the cycle aborts without a snapshot.
    pub async fn collect<S: RemoteSession>(
        &self,
        session: &mut S,
        registry: &CollectorRegistry,
        id: SnapshotId,
    ) -> Result<Snapshot, CollectError> {
        let mut snapshot = Snapshot::new(id);

        for collector in registry.iter() {
            let output = tokio::time::timeout(self.command_timeout, session.run(&collector.command))
                .await
                .unwrap_or_else(|_| {
                    Err(CommandError::new(
                        collector.command.clone(),
                        CommandErrorKind::TimedOut(self.command_timeout),
                    ))
                })
                .map_err(|source| CollectError::Command {
                    collector: collector.name.clone(),
                    source,
                })?;

            let value = collector
                .format
                .parse(&output)
                .map_err(|message| CollectError::Parse {
                    collector: collector.name.clone(),
                    message,
                })?;

            tracing::debug!(collector = %collector.name, bytes = output.len(), "Collector ran");
            snapshot.entries.insert(collector.name.clone(), value);
        }

        Ok(snapshot)
    }
}

impl Default for CollectionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}
