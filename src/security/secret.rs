//! Process secret used to sign confirmation tokens.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretSlice};
use sha2::Sha256;

use super::ConfirmationError;

type HmacSha256 = Hmac<Sha256>;

pub const SECRET_LEN: usize = 32;

/// HMAC key for confirmation tokens. Zeroized on drop, redacted in `Debug`.
#[derive(Debug)]
pub struct ProcessSecret {
    key: SecretSlice<u8>,
}

impl ProcessSecret {
    /// Fresh 32 random bytes.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; SECRET_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { key: bytes.into() }
    }

    /// Load from the store, or generate and try to persist a fresh secret.
    ///
    /// A store that cannot be written still yields a usable secret; grants
    /// remembered with it simply stop verifying after a restart.
    pub async fn load_or_generate(store: &dyn SecretStore) -> Self {
        match store.load().await {
            Ok(Some(bytes)) if bytes.len() >= SECRET_LEN => return Self::from_bytes(bytes),
            Ok(Some(_)) => tracing::warn!("stored confirmation secret too short, regenerating"),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "failed to read confirmation secret"),
        }

        let secret = Self::generate();
        if let Err(e) = store.store(secret.key.expose_secret()).await {
            tracing::warn!(error = %e, "confirmation secret not persisted; session-scoped");
        }
        secret
    }

    fn mac(
        &self,
        tool: &str,
        path: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<HmacSha256, ConfirmationError> {
        let mut mac = HmacSha256::new_from_slice(self.key.expose_secret()).map_err(|e| {
            ConfirmationError::Secret {
                message: e.to_string(),
            }
        })?;
        mac.update(token_payload(tool, path, issued_at).as_bytes());
        Ok(mac)
    }

    /// Hex HMAC-SHA256 over `<tool>:<path>:<issued_at_ms>`.
    pub fn sign(
        &self,
        tool: &str,
        path: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, ConfirmationError> {
        Ok(hex::encode(
            self.mac(tool, path, issued_at)?.finalize().into_bytes(),
        ))
    }

    /// Constant-time comparison of a presented hex token.
    pub fn verify(&self, tool: &str, path: &str, issued_at: DateTime<Utc>, token: &str) -> bool {
        let Ok(presented) = hex::decode(token) else {
            return false;
        };
        self.mac(tool, path, issued_at)
            .map(|mac| mac.verify_slice(&presented).is_ok())
            .unwrap_or(false)
    }
}

fn token_payload(tool: &str, path: &str, issued_at: DateTime<Utc>) -> String {
    format!("{}:{}:{}", tool, path, issued_at.timestamp_millis())
}

/// Where the process secret lives between runs.
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    async fn load(&self) -> std::io::Result<Option<Vec<u8>>>;
    async fn store(&self, secret: &[u8]) -> std::io::Result<()>;
}

/// Hex-encoded secret in a single file, mode 0600 on unix.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    /// Store the secret in `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<platform data dir>/toolgate/confirmation.key`
    pub fn default_location() -> Option<Self> {
        directories::ProjectDirs::from("", "", "toolgate")
            .map(|dirs| Self::new(dirs.data_dir().join("confirmation.key")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl SecretStore for FileSecretStore {
    async fn load(&self) -> std::io::Result<Option<Vec<u8>>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => hex::decode(content.trim())
                .map(Some)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn store(&self, secret: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, hex::encode(secret)).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        Ok(())
    }
}

/// Secret held for the lifetime of the store only.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    bytes: tokio::sync::RwLock<Option<Vec<u8>>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SecretStore for MemorySecretStore {
    async fn load(&self) -> std::io::Result<Option<Vec<u8>>> {
        Ok(self.bytes.read().await.clone())
    }

    async fn store(&self, secret: &[u8]) -> std::io::Result<()> {
        *self.bytes.write().await = Some(secret.to_vec());
        Ok(())
    }
}
