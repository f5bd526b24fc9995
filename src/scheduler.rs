//! Per-host collection scheduling.
//!
//! Each monitored host gets one independent [`HostWorker`] task. In
//! continuous mode the worker holds a session open and drives one
//! collection cycle per interval tick; any connection or collection error
//! closes the session and the worker reconnects after the retry delay,
//! forever — a host is never abandoned. In one-shot mode the worker
//! performs exactly one connect → collect → persist attempt and terminates
//! regardless of outcome.
//!
//! Workers share nothing mutable; coordination is limited to the
//! [`CancellationToken`] every worker observes between suspension points.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::collector::CollectorRegistry;
use crate::engine::{CollectError, CollectionEngine};
use crate::session::{Connector, RemoteSession};
use crate::snapshot::SnapshotId;
use crate::store::SnapshotStore;
use crate::target::HostTarget;

/// Default collection interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Default reconnect delay.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(15);

fn default_retry_delay() -> Duration {
    DEFAULT_RETRY_DELAY
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_max_delay() -> Duration {
    DEFAULT_RETRY_DELAY
}

/// Reconnect backoff policy.
///
/// The defaults reproduce a fixed 15s delay; a multiplier above 1.0 turns
/// it into capped exponential backoff. The delay resets after every
/// successful connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first reconnect attempt (default: 15s).
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Factor applied to the delay after each failed attempt (default: 1.0).
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Upper bound on the delay (default: 15s).
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_RETRY_DELAY,
            multiplier: 1.0,
            max_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            current: self.initial_delay,
        }
    }
}

/// Mutable backoff state for one disconnected stretch.
struct Backoff {
    policy: RetryPolicy,
    current: Duration,
}

impl Backoff {
    /// Delay to wait before the next attempt, then advance.
    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let scaled = self.current.as_secs_f64() * self.policy.multiplier;
        self.current = Duration::from_secs_f64(scaled).min(self.policy.max_delay);
        delay
    }

    fn reset(&mut self) {
        self.current = self.policy.initial_delay;
    }
}

/// How a worker drives collection for its host.
#[derive(Debug, Clone)]
pub enum WorkerMode {
    /// Periodic collection at a fixed interval, reconnecting forever.
    Continuous { interval: Duration },
    /// A single labelled connect → collect → persist attempt.
    OneShot { label: String },
}

/// One host's collection worker.
///
/// Owns the host target and, while connected, the session handle; nothing
/// here is shared with other workers.
pub struct HostWorker<C: Connector> {
    connector: Arc<C>,
    target: HostTarget,
    registry: Arc<CollectorRegistry>,
    engine: CollectionEngine,
    store: Arc<SnapshotStore>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl<C: Connector> HostWorker<C> {
    pub fn new(
        connector: Arc<C>,
        target: HostTarget,
        registry: Arc<CollectorRegistry>,
        engine: CollectionEngine,
        store: Arc<SnapshotStore>,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connector,
            target,
            registry,
            engine,
            store,
            retry,
            cancel,
        }
    }

    /// Drive this host until the mode completes or the token is cancelled.
    pub async fn run(self, mode: WorkerMode) {
        match mode {
            WorkerMode::Continuous { interval } => self.run_continuous(interval).await,
            WorkerMode::OneShot { label } => self.run_once(label).await,
        }
    }

    /// Continuous mode: connect, tick, collect; on any error close the
    /// session, wait out the retry delay, reconnect. Ends only on
    /// cancellation.
    async fn run_continuous(self, interval: Duration) {
        let host = self.target.host.clone();
        let mut backoff = self.retry.backoff();

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(host = %host, "Worker cancelled");
                return;
            }

            let mut session = tokio::select! {
                _ = self.cancel.cancelled() => return,
                result = self.connector.connect(&self.target) => match result {
                    Ok(session) => session,
                    Err(e) => {
                        let delay = backoff.next_delay();
                        tracing::warn!(host = %host, error = %e, retry_in = ?delay, "Connection failed");
                        tokio::select! {
                            _ = self.cancel.cancelled() => return,
                            _ = tokio::time::sleep(delay) => continue,
                        }
                    }
                },
            };
            backoff.reset();

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Consume the immediate first tick: the first cycle happens one
            // interval after connecting.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        session.close().await;
                        tracing::info!(host = %host, "Worker cancelled");
                        return;
                    }
                    _ = ticker.tick() => {}
                }

                let id = SnapshotId::timestamp(Utc::now());
                // Cancellation abandons an in-flight cycle rather than
                // waiting it out.
                let result = tokio::select! {
                    _ = self.cancel.cancelled() => {
                        session.close().await;
                        tracing::info!(host = %host, "Worker cancelled");
                        return;
                    }
                    result = self.cycle(&mut session, id) => result,
                };
                match result {
                    Ok(()) => {}
                    Err(e) => {
                        tracing::error!(host = %host, collector = %e.collector(), error = %e, "Collection cycle failed");
                        break;
                    }
                }
            }

            session.close().await;
            let delay = backoff.next_delay();
            tracing::info!(host = %host, retry_in = ?delay, "Session closed, reconnecting");
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One-shot mode: exactly one attempt, no retry, any outcome terminates
    /// the worker.
    async fn run_once(self, label: String) {
        let host = self.target.host.clone();

        let connect = tokio::select! {
            _ = self.cancel.cancelled() => return,
            result = self.connector.connect(&self.target) => result,
        };
        let mut session = match connect {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(host = %host, error = %e, "Connection failed, named collection skipped");
                return;
            }
        };

        let result = tokio::select! {
            _ = self.cancel.cancelled() => {
                session.close().await;
                return;
            }
            result = self.cycle(&mut session, SnapshotId::named(label)) => result,
        };
        session.close().await;

        if let Err(e) = result {
            tracing::error!(host = %host, collector = %e.collector(), error = %e, "Named collection failed");
        }
    }

    /// One collection cycle: collect, then persist. Persistence failures
    /// are logged but do not count as a cycle failure — the session stays
    /// live and the schedule continues.
    async fn cycle(
        &self,
        session: &mut C::Session,
        id: SnapshotId,
    ) -> Result<(), CollectError> {
        let snapshot = self.engine.collect(session, &self.registry, id).await?;

        if let Err(e) = self.store.write(&self.target.host, &snapshot).await {
            tracing::warn!(host = %self.target.host, id = %snapshot.id, error = %e, "Snapshot write failed");
        }
        Ok(())
    }
}
