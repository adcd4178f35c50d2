//! Token persistence backends.

use async_trait::async_trait;
use bulwark_core::OAuthToken;
use bulwark_error::{BulwarkResult, StorageError, StorageErrorKind};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Persistence for OAuth tokens, keyed by client name.
#[async_trait]
pub trait TokenStorage: Send + Sync + fmt::Debug {
    /// Store the token for `client`, replacing any previous one.
    async fn save(&self, client: &str, token: &OAuthToken) -> BulwarkResult<()>;

    /// Load the token for `client`; `Ok(None)` when nothing is stored.
    async fn load(&self, client: &str) -> BulwarkResult<Option<OAuthToken>>;

    /// Remove the token for `client`. Deleting a missing token succeeds.
    async fn delete(&self, client: &str) -> BulwarkResult<()>;
}

/// Process-local token storage. The default backend.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    tokens: RwLock<HashMap<String, OAuthToken>>,
}

impl MemoryTokenStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStorage for MemoryTokenStorage {
    async fn save(&self, client: &str, token: &OAuthToken) -> BulwarkResult<()> {
        self.tokens
            .write()
            .await
            .insert(client.to_string(), token.clone());
        Ok(())
    }

    async fn load(&self, client: &str) -> BulwarkResult<Option<OAuthToken>> {
        Ok(self.tokens.read().await.get(client).cloned())
    }

    async fn delete(&self, client: &str) -> BulwarkResult<()> {
        self.tokens.write().await.remove(client);
        Ok(())
    }
}

/// Stores one JSON file per client under a directory.
///
/// ```text
/// {base_path}/trakt.json
/// {base_path}/spotify.json
/// ```
///
/// Writes go to a temp file first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    base_path: PathBuf,
}

impl FileTokenStorage {
    /// Create the storage, creating `base_path` if needed.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created.
    #[instrument(skip(base_path))]
    pub fn new(base_path: impl Into<PathBuf>) -> BulwarkResult<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path).map_err(|e| {
            StorageError::new(StorageErrorKind::DirectoryCreation(format!(
                "{}: {}",
                base_path.display(),
                e
            )))
        })?;
        debug!(path = %base_path.display(), "Created token storage directory");
        Ok(Self { base_path })
    }

    /// Directory holding the token files.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// File used for `client`. Characters outside `[A-Za-z0-9_-]` become `_`.
    pub fn path_for(&self, client: &str) -> PathBuf {
        let name: String = client
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.base_path.join(format!("{}.json", name))
    }
}

#[async_trait]
impl TokenStorage for FileTokenStorage {
    #[instrument(skip(self, token))]
    async fn save(&self, client: &str, token: &OAuthToken) -> BulwarkResult<()> {
        let path = self.path_for(client);
        let data = serde_json::to_vec_pretty(token)
            .map_err(|e| StorageError::new(StorageErrorKind::Serialization(e.to_string())))?;

        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, data).await.map_err(|e| {
            StorageError::new(StorageErrorKind::FileWrite(format!(
                "{}: {}",
                temp_path.display(),
                e
            )))
        })?;
        tokio::fs::rename(&temp_path, &path).await.map_err(|e| {
            StorageError::new(StorageErrorKind::FileWrite(format!(
                "rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            )))
        })?;

        debug!(path = %path.display(), "Saved token");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load(&self, client: &str) -> BulwarkResult<Option<OAuthToken>> {
        let path = self.path_for(client);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::new(StorageErrorKind::FileRead(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
                .into());
            }
        };
        let token = serde_json::from_slice(&data).map_err(|e| {
            StorageError::new(StorageErrorKind::Serialization(format!(
                "{}: {}",
                path.display(),
                e
            )))
        })?;
        Ok(Some(token))
    }

    #[instrument(skip(self))]
    async fn delete(&self, client: &str) -> BulwarkResult<()> {
        let path = self.path_for(client);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::new(StorageErrorKind::FileDelete(format!(
                "{}: {}",
                path.display(),
                e
            )))
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_names_are_sanitised() {
        let storage = FileTokenStorage {
            base_path: PathBuf::from("/tokens"),
        };
        assert_eq!(
            storage.path_for("../etc/passwd"),
            PathBuf::from("/tokens/___etc_passwd.json")
        );
        assert_eq!(storage.path_for("trakt-tv"), PathBuf::from("/tokens/trakt-tv.json"));
    }

    #[tokio::test]
    async fn memory_round_trip() {
        let storage = MemoryTokenStorage::new();
        assert!(storage.load("a").await.unwrap().is_none());
        storage.save("a", &OAuthToken::new("x")).await.unwrap();
        assert_eq!(storage.load("a").await.unwrap().unwrap().access_token, "x");
        storage.delete("a").await.unwrap();
        storage.delete("a").await.unwrap();
        assert!(storage.load("a").await.unwrap().is_none());
    }
}
