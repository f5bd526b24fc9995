//! One-time credential bootstrapping.
//!
//! Generates a local `bootstrap.key` / `bootstrap.key.pub` pair on first
//! use and ensures the public key is present in a target's
//! `~/.ssh/authorized_keys`. The core scheduler never calls into this
//! module; the binary runs it before scheduling and points each target's
//! identity file at the bootstrap key.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::session::{CommandError, ConnectionError, Connector, RemoteSession};
use crate::target::HostTarget;

/// Private key filename, created in the working directory.
pub const BOOTSTRAP_KEY_FILE: &str = "bootstrap.key";

/// Public key filename, alongside the private key.
pub const BOOTSTRAP_PUB_FILE: &str = "bootstrap.key.pub";

/// Errors during bootstrap provisioning.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Local key file I/O failed.
    #[error("bootstrap key I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Key material could not be generated or encoded.
    #[error("bootstrap key error: {0}")]
    Key(#[from] russh_keys::Error),

    /// The key generator produced nothing.
    #[error("key generation failed")]
    KeyGeneration,

    /// One half of an existing keypair is missing; refusing to overwrite.
    #[error("{present} exists but {missing} does not; restore it or remove both and rerun bootstrap")]
    HalfProvisioned { present: String, missing: String },

    /// The target could not be reached.
    #[error(transparent)]
    Connect(#[from] ConnectionError),

    /// A provisioning command failed on the target.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// A usable bootstrap keypair on disk.
#[derive(Debug, Clone)]
pub struct BootstrapKey {
    /// Path to the PEM-encoded private key.
    pub private_key_path: PathBuf,
    /// Single-line `authorized_keys` form of the public key.
    pub public_key_line: String,
}

/// Load the bootstrap keypair from `dir`, generating it when absent.
///
/// A directory containing only one half of the pair is an error rather
/// than silently regenerating, since the old public key may already be
/// authorized on remote hosts.
pub fn ensure_keypair(dir: &Path) -> Result<BootstrapKey, BootstrapError> {
    let key_path = dir.join(BOOTSTRAP_KEY_FILE);
    let pub_path = dir.join(BOOTSTRAP_PUB_FILE);

    match (key_path.is_file(), pub_path.is_file()) {
        (true, true) => {
            let public_key_line = std::fs::read_to_string(&pub_path)?.trim_end().to_string();
            Ok(BootstrapKey {
                private_key_path: key_path,
                public_key_line,
            })
        }
        (false, false) => generate_keypair(&key_path, &pub_path),
        (true, false) => Err(BootstrapError::HalfProvisioned {
            present: key_path.display().to_string(),
            missing: pub_path.display().to_string(),
        }),
        (false, true) => Err(BootstrapError::HalfProvisioned {
            present: pub_path.display().to_string(),
            missing: key_path.display().to_string(),
        }),
    }
}

fn generate_keypair(key_path: &Path, pub_path: &Path) -> Result<BootstrapKey, BootstrapError> {
    use russh_keys::PublicKeyBase64;

    tracing::info!(path = %key_path.display(), "Generating bootstrap keypair");

    let key = russh_keys::key::KeyPair::generate_ed25519().ok_or(BootstrapError::KeyGeneration)?;

    let mut pem = Vec::new();
    russh_keys::encode_pkcs8_pem(&key, &mut pem)?;
    std::fs::write(key_path, &pem)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(key_path, std::fs::Permissions::from_mode(0o600))?;
    }

    let public = key.clone_public_key()?;
    let public_key_line = format!("{} {}", public.name(), public.public_key_base64());
    std::fs::write(pub_path, format!("{}\n", public_key_line))?;

    Ok(BootstrapKey {
        private_key_path: key_path.to_path_buf(),
        public_key_line,
    })
}

/// Ensure `public_key_line` is authorized on the target host.
///
/// Connects with the target's current credentials, checks
/// `~/.ssh/authorized_keys`, and appends the key when missing. The session
/// is closed on every path.
pub async fn authorize<C: Connector>(
    connector: &C,
    target: &HostTarget,
    public_key_line: &str,
) -> Result<(), BootstrapError> {
    let line = public_key_line.trim_end();
    let mut session = connector.connect(target).await?;
    let result = provision(&mut session, target, line).await;
    session.close().await;
    result
}

async fn provision<S: RemoteSession>(
    session: &mut S,
    target: &HostTarget,
    line: &str,
) -> Result<(), BootstrapError> {
    let check = format!("grep -qF \"{}\" ~/.ssh/authorized_keys", line);
    if session.run(&check).await.is_ok() {
        tracing::debug!(host = %target.host, "Bootstrap key already authorized");
        return Ok(());
    }

    tracing::info!(host = %target.host, "Adding bootstrap key to authorized_keys");
    session.run("mkdir -p ~/.ssh && chmod 700 ~/.ssh").await?;
    session
        .run(&format!("echo \"{}\" >> ~/.ssh/authorized_keys", line))
        .await?;
    Ok(())
}
