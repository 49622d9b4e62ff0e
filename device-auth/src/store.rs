use crate::credential::Credential;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Persistence for credentials, keyed by the principal they belong to.
pub trait TokenStore: Send + Sync {
    fn load(&self, principal: &str) -> Result<Option<Credential>, StoreError>;
    fn save(&self, principal: &str, credential: &Credential) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("access credential file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("credential file {} is malformed", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Stores each principal's credential as a JSON file inside one directory.
#[derive(Debug, Clone)]
pub struct JsonFileTokenStore {
    dir: PathBuf,
}

impl JsonFileTokenStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, principal: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(principal)))
    }
}

/// Maps a principal onto a file name that is safe on every platform.
fn file_stem(principal: &str) -> String {
    let stem: String = principal
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.trim_matches(['_', '.']).is_empty() {
        "default".to_string()
    } else {
        stem
    }
}

impl TokenStore for JsonFileTokenStore {
    fn load(&self, principal: &str) -> Result<Option<Credential>, StoreError> {
        let path = self.path_for(principal);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let credential =
            serde_json::from_str(&raw).map_err(|source| StoreError::Format { path, source })?;
        Ok(Some(credential))
    }

    fn save(&self, principal: &str, credential: &Credential) -> Result<(), StoreError> {
        let path = self.path_for(principal);
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let json = serde_json::to_string_pretty(credential).map_err(|source| {
            StoreError::Format {
                path: path.clone(),
                source,
            }
        })?;
        std::fs::write(&path, json).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .map_err(|source| StoreError::Io { path, source })?;
        }
        tracing::debug!(principal, "persisted credential");
        Ok(())
    }
}

/// A store that forgets everything when dropped.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    credentials: Mutex<HashMap<String, Credential>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self, principal: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self
            .credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(principal)
            .cloned())
    }

    fn save(&self, principal: &str, credential: &Credential) -> Result<(), StoreError> {
        self.credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(principal.to_string(), credential.clone());
        Ok(())
    }
}
