//! Host target parsing and resolution.
//!
//! A host argument has the shape `[user@]host[:port]`. Missing pieces are
//! filled in from the user's SSH client configuration (`~/.ssh/config`,
//! exact `Host` match) and finally from defaults: port 22, the invoking
//! user, and `~/.ssh/id_rsa` when present. All ambient inputs come in
//! through an explicit [`ResolveContext`] rather than process globals.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

/// Default SSH port.
const DEFAULT_PORT: u16 = 22;

/// Errors parsing a host argument.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    /// The host part was empty.
    #[error("empty host in target '{0}'")]
    EmptyHost(String),

    /// The port part was not a valid port number.
    #[error("bad port '{0}'")]
    BadPort(String),
}

/// The resolved connection descriptor for one monitored host.
///
/// Immutable once resolved, except `identity_file`, which the bootstrap
/// collaborator may point at the bootstrap key before scheduling starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub identity_file: Option<PathBuf>,
}

impl HostTarget {
    /// `host:port` form used in logs and connection errors.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A parsed but unresolved `[user@]host[:port]` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

impl FromStr for TargetSpec {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user, rest) = match s.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some((_, rest)) => (None, rest),
            None => (None, s),
        };

        let (host, port) = match rest.split_once(':') {
            Some((host, port)) => {
                let parsed: u16 = port
                    .parse()
                    .map_err(|_| TargetError::BadPort(port.to_string()))?;
                if parsed == 0 {
                    return Err(TargetError::BadPort(port.to_string()));
                }
                (host, Some(parsed))
            }
            None => (rest, None),
        };

        if host.is_empty() {
            return Err(TargetError::EmptyHost(s.to_string()));
        }

        Ok(Self {
            user,
            host: host.to_string(),
            port,
        })
    }
}

impl TargetSpec {
    /// Resolve into a [`HostTarget`].
    ///
    /// Precedence per field: explicit value in the spec or flag, then the
    /// SSH client config entry for the host alias, then context defaults.
    pub fn resolve(self, explicit_identity: Option<&Path>, ctx: &ResolveContext) -> HostTarget {
        let entry = ctx.ssh_config.lookup(&self.host);

        let host = entry
            .and_then(|e| e.host_name.clone())
            .unwrap_or(self.host);
        let port = self
            .port
            .or_else(|| entry.and_then(|e| e.port))
            .unwrap_or(DEFAULT_PORT);
        let user = self
            .user
            .or_else(|| entry.and_then(|e| e.user.clone()))
            .unwrap_or_else(|| ctx.current_user.clone());

        let identity_file = explicit_identity
            .map(Path::to_path_buf)
            .or_else(|| entry.and_then(|e| e.identity_file.as_deref().map(|p| ctx.expand_home(p))))
            .or_else(|| ctx.default_identity());

        HostTarget {
            host,
            port,
            user,
            identity_file,
        }
    }
}

/// Ambient inputs needed during resolution, passed in explicitly.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    /// The invoking OS user, used when no user was given anywhere.
    pub current_user: String,
    /// Home directory, for `~` expansion and the default identity file.
    pub home_dir: Option<PathBuf>,
    /// Parsed SSH client configuration.
    pub ssh_config: SshClientConfig,
}

impl ResolveContext {
    /// Build a context from the process environment, loading
    /// `~/.ssh/config` when it exists.
    pub fn from_env() -> Self {
        let current_user = std::env::var("USER")
            .or_else(|_| std::env::var("LOGNAME"))
            .unwrap_or_else(|_| "root".to_string());
        let home_dir = dirs::home_dir();

        let ssh_config = home_dir
            .as_ref()
            .map(|home| home.join(".ssh").join("config"))
            .filter(|path| path.is_file())
            .and_then(|path| match std::fs::read_to_string(&path) {
                Ok(content) => Some(SshClientConfig::parse(&content)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read SSH config");
                    None
                }
            })
            .unwrap_or_default();

        Self {
            current_user,
            home_dir,
            ssh_config,
        }
    }

    /// Expand a leading `~/` against the context home directory.
    fn expand_home(&self, path: &str) -> PathBuf {
        match (path.strip_prefix("~/"), &self.home_dir) {
            (Some(rest), Some(home)) => home.join(rest),
            _ => PathBuf::from(path),
        }
    }

    /// `~/.ssh/id_rsa`, but only when the file actually exists.
    fn default_identity(&self) -> Option<PathBuf> {
        let path = self.home_dir.as_ref()?.join(".ssh").join("id_rsa");
        path.is_file().then_some(path)
    }
}

/// One `Host` block from an SSH client configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshHostEntry {
    pub aliases: Vec<String>,
    pub host_name: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub identity_file: Option<String>,
}

/// Minimal SSH client configuration: `Host` blocks with the four keywords
/// resolution cares about. Wildcard patterns are ignored; lookup is by
/// exact alias.
#[derive(Debug, Clone, Default)]
pub struct SshClientConfig {
    entries: Vec<SshHostEntry>,
}

impl SshClientConfig {
    /// Parse configuration text. Unknown keywords are skipped.
    pub fn parse(content: &str) -> Self {
        let mut entries = Vec::new();
        let mut current: Option<SshHostEntry> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let Some(keyword) = parts.next() else {
                continue;
            };
            let rest: Vec<&str> = parts.collect();

            if keyword.eq_ignore_ascii_case("host") {
                if let Some(entry) = current.take() {
                    entries.push(entry);
                }
                current = Some(SshHostEntry {
                    aliases: rest.iter().map(|a| a.to_string()).collect(),
                    ..Default::default()
                });
                continue;
            }

            let Some(entry) = current.as_mut() else {
                continue;
            };
            let Some(value) = rest.first() else {
                continue;
            };
            if keyword.eq_ignore_ascii_case("hostname") {
                entry.host_name = Some(value.to_string());
            } else if keyword.eq_ignore_ascii_case("port") {
                entry.port = value.parse().ok();
            } else if keyword.eq_ignore_ascii_case("user") {
                entry.user = Some(value.to_string());
            } else if keyword.eq_ignore_ascii_case("identityfile") {
                entry.identity_file = Some(value.to_string());
            }
        }
        if let Some(entry) = current.take() {
            entries.push(entry);
        }

        Self { entries }
    }

    /// Find the entry whose alias list contains `host` exactly.
    pub fn lookup(&self, host: &str) -> Option<&SshHostEntry> {
        self.entries
            .iter()
            .find(|e| e.aliases.iter().any(|a| a == host))
    }
}
