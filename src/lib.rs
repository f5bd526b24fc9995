//! Periscope - remote fleet stats collection over SSH.
//!
//! This crate provides the core of the periscope monitoring tool: it opens
//! an SSH session per monitored host, runs an ordered set of named remote
//! probes ("collectors") against it, and persists each complete result as
//! a timestamped or labelled snapshot. It can be used as a library or run
//! through the `periscope` executable.
//!
//! # Architecture
//!
//! - **Session**: SSH connection lifecycle per host ([`session`])
//! - **Collectors**: named remote commands, loaded once from configuration
//!   ([`collector`], [`config`])
//! - **Engine**: one fail-fast collection cycle producing a [`Snapshot`]
//!   ([`engine`])
//! - **Scheduler**: one independent worker per host, continuous or
//!   one-shot, reconnecting forever in continuous mode ([`scheduler`])
//! - **Store**: JSON snapshot files under `timeSeries/` and `collections/`
//!   ([`store`])
//! - **Bootstrap**: keypair generation and remote authorized-key
//!   provisioning, run by the binary before scheduling ([`bootstrap`])

pub mod bootstrap;
pub mod collector;
pub mod config;
pub mod engine;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod target;

pub use collector::{CollectorRegistry, DataCollector, OutputFormat};
pub use engine::{CollectError, CollectionEngine};
pub use scheduler::{HostWorker, RetryPolicy, WorkerMode};
pub use session::{CommandError, ConnectionError, Connector, RemoteSession, SshConnector};
pub use snapshot::{CollectorValue, Snapshot, SnapshotId};
pub use store::{SnapshotStore, StoreError};
pub use target::{HostTarget, ResolveContext, TargetSpec};
