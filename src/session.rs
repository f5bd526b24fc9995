//! SSH session management.
//!
//! [`SshConnector`] opens one authenticated SSH connection per host and
//! hands out an [`SshSession`] that runs exactly one remote command at a
//! time. The [`Connector`] and [`RemoteSession`] traits are the seam the
//! collection engine and scheduler are written against, so both can be
//! exercised with scripted sessions in tests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use russh::client;
use russh::{ChannelMsg, Disconnect};
use thiserror::Error;

use crate::target::HostTarget;

/// Default handshake inactivity timeout.
const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors reaching a host.
///
/// Unreachable host, handshake failure, and authentication rejection are
/// deliberately one type: callers treat them identically (log, delay,
/// reconnect).
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// TCP connect or SSH handshake failed.
    #[error("failed to reach {addr}: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: russh::Error,
    },

    /// No identity file to authenticate with.
    #[error("no identity file available for {user}@{addr}")]
    MissingIdentity { user: String, addr: String },

    /// Identity file could not be loaded or parsed.
    #[error("failed to load identity file {path}: {source}")]
    Identity {
        path: PathBuf,
        #[source]
        source: russh_keys::Error,
    },

    /// The server rejected the offered key.
    #[error("authentication rejected for {user}@{addr}")]
    AuthRejected { user: String, addr: String },
}

/// Why a remote command failed.
#[derive(Debug, Error)]
pub enum CommandErrorKind {
    /// The command ran but exited non-zero.
    #[error("exited with status {0}")]
    NonZeroExit(u32),

    /// The exec channel or transport failed mid-command.
    #[error("transport failure: {0}")]
    Transport(#[from] russh::Error),

    /// The command did not complete within the configured timeout.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The session was already closed.
    #[error("session is closed")]
    SessionClosed,
}

/// A remote command failure, carrying the command that was run.
#[derive(Debug, Error)]
#[error("command '{command}' failed: {kind}")]
pub struct CommandError {
    /// The remote shell command that failed.
    pub command: String,
    /// Underlying cause.
    pub kind: CommandErrorKind,
}

impl CommandError {
    /// Build an error for the given command. Public so alternative
    /// [`RemoteSession`] implementations can report failures.
    pub fn new(command: impl Into<String>, kind: CommandErrorKind) -> Self {
        Self {
            command: command.into(),
            kind,
        }
    }
}

/// A live connection that executes one remote command at a time.
#[async_trait::async_trait]
pub trait RemoteSession: Send {
    /// Execute one command to completion and return its captured output.
    ///
    /// Each call is independent; there is no command-level retry.
    async fn run(&mut self, command: &str) -> Result<Vec<u8>, CommandError>;

    /// Tear the connection down. Idempotent; invoked on every exit path.
    async fn close(&mut self);

    /// Whether the session is still considered live.
    fn is_live(&self) -> bool;
}

/// Opens sessions against resolved host targets.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    type Session: RemoteSession;

    /// Blocking (for the calling worker) network + auth handshake.
    async fn connect(&self, target: &HostTarget) -> Result<Self::Session, ConnectionError>;
}

/// russh client handler.
struct ClientHandler;

#[async_trait::async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Host keys are not verified; targets are provisioned hosts reached
        // over trusted networks.
        Ok(true)
    }
}

/// SSH-backed [`Connector`].
pub struct SshConnector {
    config: Arc<client::Config>,
}

impl SshConnector {
    /// Create a connector with the default client configuration.
    pub fn new() -> Self {
        let config = client::Config {
            inactivity_timeout: Some(DEFAULT_INACTIVITY_TIMEOUT),
            ..Default::default()
        };
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Connector for SshConnector {
    type Session = SshSession;

    async fn connect(&self, target: &HostTarget) -> Result<SshSession, ConnectionError> {
        let addr = target.addr();

        let identity = target
            .identity_file
            .as_ref()
            .ok_or_else(|| ConnectionError::MissingIdentity {
                user: target.user.clone(),
                addr: addr.clone(),
            })?;
        let key = russh_keys::load_secret_key(identity, None).map_err(|source| {
            ConnectionError::Identity {
                path: identity.clone(),
                source,
            }
        })?;

        tracing::debug!(addr = %addr, user = %target.user, "Opening SSH connection");
        let mut handle = client::connect(
            Arc::clone(&self.config),
            (target.host.as_str(), target.port),
            ClientHandler,
        )
        .await
        .map_err(|source| ConnectionError::Unreachable {
            addr: addr.clone(),
            source,
        })?;

        let authenticated = handle
            .authenticate_publickey(target.user.as_str(), Arc::new(key))
            .await
            .map_err(|source| ConnectionError::Unreachable {
                addr: addr.clone(),
                source,
            })?;
        if !authenticated {
            return Err(ConnectionError::AuthRejected {
                user: target.user.clone(),
                addr,
            });
        }

        tracing::info!(addr = %addr, user = %target.user, "SSH session established");
        Ok(SshSession { handle, live: true })
    }
}

/// One live SSH connection, exclusively owned by a single host worker.
pub struct SshSession {
    handle: client::Handle<ClientHandler>,
    live: bool,
}

#[async_trait::async_trait]
impl RemoteSession for SshSession {
    async fn run(&mut self, command: &str) -> Result<Vec<u8>, CommandError> {
        if !self.live {
            return Err(CommandError::new(command, CommandErrorKind::SessionClosed));
        }

        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| CommandError::new(command, CommandErrorKind::Transport(e)))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| CommandError::new(command, CommandErrorKind::Transport(e)))?;

        let mut output = Vec::new();
        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => output.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                _ => {}
            }
        }

        // Servers occasionally close the channel without an exit-status
        // message; treat that as success with whatever was captured.
        match exit_status.unwrap_or(0) {
            0 => Ok(output),
            code => Err(CommandError::new(
                command,
                CommandErrorKind::NonZeroExit(code),
            )),
        }
    }

    async fn close(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            tracing::debug!(error = %e, "Disconnect after session close failed");
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }
}
