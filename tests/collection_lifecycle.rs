//! Collection lifecycle integration tests.
//!
//! Drives host workers end to end against a scripted connector and checks
//! what reaches disk: complete snapshots only, in the documented layout,
//! decoding back to exactly what was collected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use periscope::{
    collector::{CollectorRegistry, DataCollector},
    scheduler::{HostWorker, RetryPolicy, WorkerMode},
    session::{CommandError, CommandErrorKind, ConnectionError, Connector, RemoteSession},
    snapshot::{CollectorValue, SnapshotId},
    store::SnapshotStore,
    target::HostTarget,
    CollectionEngine,
};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Test Helpers
// =============================================================================

/// Connector handing out sessions with canned per-command output.
struct ScriptedConnector {
    responses: HashMap<String, Result<Vec<u8>, u32>>,
    connects: AtomicUsize,
}

impl ScriptedConnector {
    fn new() -> Self {
        Self {
            responses: HashMap::new(),
            connects: AtomicUsize::new(0),
        }
    }

    fn with_output(mut self, command: &str, output: &[u8]) -> Self {
        self.responses
            .insert(command.to_string(), Ok(output.to_vec()));
        self
    }

    fn with_failure(mut self, command: &str, status: u32) -> Self {
        self.responses.insert(command.to_string(), Err(status));
        self
    }
}

struct ScriptedSession {
    responses: HashMap<String, Result<Vec<u8>, u32>>,
    live: bool,
}

#[async_trait::async_trait]
impl RemoteSession for ScriptedSession {
    async fn run(&mut self, command: &str) -> Result<Vec<u8>, CommandError> {
        match self.responses.get(command) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(status)) => Err(CommandError::new(
                command,
                CommandErrorKind::NonZeroExit(*status),
            )),
            None => Err(CommandError::new(
                command,
                CommandErrorKind::NonZeroExit(127),
            )),
        }
    }

    async fn close(&mut self) {
        self.live = false;
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

#[async_trait::async_trait]
impl Connector for ScriptedConnector {
    type Session = ScriptedSession;

    async fn connect(&self, _target: &HostTarget) -> Result<ScriptedSession, ConnectionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedSession {
            responses: self.responses.clone(),
            live: true,
        })
    }
}

/// Connector that never reaches its host.
struct UnreachableConnector {
    attempt_log: Mutex<Vec<tokio::time::Instant>>,
}

#[async_trait::async_trait]
impl Connector for UnreachableConnector {
    type Session = ScriptedSession;

    async fn connect(&self, target: &HostTarget) -> Result<ScriptedSession, ConnectionError> {
        self.attempt_log.lock().unwrap().push(tokio::time::Instant::now());
        Err(ConnectionError::AuthRejected {
            user: target.user.clone(),
            addr: target.addr(),
        })
    }
}

fn target(host: &str) -> HostTarget {
    HostTarget {
        host: host.to_string(),
        port: 22,
        user: "operator".to_string(),
        identity_file: None,
    }
}

fn uptime_registry() -> Arc<CollectorRegistry> {
    Arc::new(CollectorRegistry::new(vec![DataCollector::new(
        "uptime",
        "cat /proc/uptime",
    )]))
}

fn worker<C: Connector>(
    connector: Arc<C>,
    registry: Arc<CollectorRegistry>,
    store: Arc<SnapshotStore>,
    cancel: CancellationToken,
    host: &str,
) -> HostWorker<C> {
    HostWorker::new(
        connector,
        target(host),
        registry,
        CollectionEngine::default(),
        store,
        RetryPolicy::default(),
        cancel,
    )
}

/// Let spawned tasks run past timers and pending blocking file I/O.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
        std::thread::sleep(Duration::from_millis(1));
    }
}

// =============================================================================
// Continuous mode
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_continuous_snapshot_reaches_disk_and_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let connector =
        Arc::new(ScriptedConnector::new().with_output("cat /proc/uptime", b"12345.67 89.01\n"));
    let store = Arc::new(SnapshotStore::new(dir.path()));
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(
        worker(
            Arc::clone(&connector),
            uptime_registry(),
            Arc::clone(&store),
            cancel.clone(),
            "db1",
        )
        .run(WorkerMode::Continuous {
            interval: Duration::from_secs(5),
        }),
    );

    settle().await;
    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;

    cancel.cancel();
    handle.await.unwrap();

    let host_dir = dir.path().join("timeSeries").join("db1");
    let files: Vec<_> = std::fs::read_dir(&host_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].extension().unwrap(), "json");

    // Decoding reproduces the identifier and the entry mapping.
    let snapshot = store.read(&files[0]).await.unwrap();
    assert!(matches!(snapshot.id, SnapshotId::Timestamp(_)));
    assert_eq!(snapshot.entries.len(), 1);
    assert_eq!(
        snapshot.entries["uptime"],
        CollectorValue::Text("12345.67 89.01\n".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_cycle_leaves_no_partial_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    // First collector succeeds, second fails: nothing may reach disk.
    let connector = Arc::new(
        ScriptedConnector::new()
            .with_output("cat /proc/uptime", b"12345.67 89.01\n")
            .with_failure("cat /proc/vmstat", 1),
    );
    let registry = Arc::new(CollectorRegistry::new(vec![
        DataCollector::new("uptime", "cat /proc/uptime"),
        DataCollector::new("vmstat", "cat /proc/vmstat"),
    ]));
    let store = Arc::new(SnapshotStore::new(dir.path()));
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(
        worker(
            Arc::clone(&connector),
            registry,
            store,
            cancel.clone(),
            "db1",
        )
        .run(WorkerMode::Continuous {
            interval: Duration::from_secs(5),
        }),
    );

    settle().await;
    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;

    cancel.cancel();
    handle.await.unwrap();

    assert!(!dir.path().join("timeSeries").join("db1").exists());
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_host_is_retried_on_the_fixed_delay() {
    let dir = tempfile::tempdir().unwrap();
    let connector = Arc::new(UnreachableConnector {
        attempt_log: Mutex::new(Vec::new()),
    });
    let store = Arc::new(SnapshotStore::new(dir.path()));
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(
        worker(
            Arc::clone(&connector),
            uptime_registry(),
            store,
            cancel.clone(),
            "db1",
        )
        .run(WorkerMode::Continuous {
            interval: Duration::from_secs(5),
        }),
    );

    settle().await;
    for _ in 0..3 {
        tokio::time::advance(Duration::from_secs(15)).await;
        settle().await;
    }
    cancel.cancel();
    handle.await.unwrap();

    let attempts = connector.attempt_log.lock().unwrap();
    assert_eq!(attempts.len(), 4);
    for pair in attempts.windows(2) {
        assert_eq!(pair[1] - pair[0], Duration::from_secs(15));
    }
}

#[tokio::test(start_paused = true)]
async fn test_workers_are_independent_across_hosts() {
    let dir = tempfile::tempdir().unwrap();
    let good =
        Arc::new(ScriptedConnector::new().with_output("cat /proc/uptime", b"1.0 1.0\n"));
    let bad = Arc::new(UnreachableConnector {
        attempt_log: Mutex::new(Vec::new()),
    });
    let store = Arc::new(SnapshotStore::new(dir.path()));
    let cancel = CancellationToken::new();

    let good_handle = tokio::spawn(
        worker(
            Arc::clone(&good),
            uptime_registry(),
            Arc::clone(&store),
            cancel.clone(),
            "db1",
        )
        .run(WorkerMode::Continuous {
            interval: Duration::from_secs(5),
        }),
    );
    let bad_handle = tokio::spawn(
        worker(
            Arc::clone(&bad),
            uptime_registry(),
            store,
            cancel.clone(),
            "db2",
        )
        .run(WorkerMode::Continuous {
            interval: Duration::from_secs(5),
        }),
    );

    settle().await;
    tokio::time::advance(Duration::from_secs(15)).await;
    settle().await;

    cancel.cancel();
    good_handle.await.unwrap();
    bad_handle.await.unwrap();

    // db1 kept collecting while db2 failed to connect.
    let db1_files = std::fs::read_dir(dir.path().join("timeSeries").join("db1"))
        .unwrap()
        .count();
    assert!(db1_files >= 1);
    assert!(!dir.path().join("timeSeries").join("db2").exists());
    assert_eq!(bad.attempt_log.lock().unwrap().len(), 2);
}

// =============================================================================
// One-shot (named) mode
// =============================================================================

#[tokio::test]
async fn test_named_collection_writes_once_and_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let connector =
        Arc::new(ScriptedConnector::new().with_output("cat /proc/uptime", b"12345.67 89.01\n"));
    let store = Arc::new(SnapshotStore::new(dir.path()));
    let cancel = CancellationToken::new();

    // Terminates on its own, no cancellation needed.
    worker(
        Arc::clone(&connector),
        uptime_registry(),
        Arc::clone(&store),
        cancel,
        "db1",
    )
    .run(WorkerMode::OneShot {
        label: "baseline".to_string(),
    })
    .await;

    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);

    let path = dir.path().join("collections").join("baseline-db1.json");
    let snapshot = store.read(&path).await.unwrap();
    assert_eq!(snapshot.id, SnapshotId::named("baseline"));
    assert_eq!(
        snapshot.entries["uptime"],
        CollectorValue::Text("12345.67 89.01\n".to_string())
    );
}

#[tokio::test]
async fn test_named_collection_empty_registry_still_persists_identifier() {
    let dir = tempfile::tempdir().unwrap();
    let connector = Arc::new(ScriptedConnector::new());
    let store = Arc::new(SnapshotStore::new(dir.path()));
    let cancel = CancellationToken::new();

    worker(
        Arc::clone(&connector),
        Arc::new(CollectorRegistry::new(vec![])),
        Arc::clone(&store),
        cancel,
        "db1",
    )
    .run(WorkerMode::OneShot {
        label: "empty".to_string(),
    })
    .await;

    let path = dir.path().join("collections").join("empty-db1.json");
    let snapshot = store.read(&path).await.unwrap();
    assert_eq!(snapshot.id, SnapshotId::named("empty"));
    assert!(snapshot.entries.is_empty());
}
