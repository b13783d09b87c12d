use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::token::{AuthUser, TokenPair};

/// Storage abstraction for persisted sign-in credentials.
pub trait TokenStore: Send + Sync {
    fn load(&self, profile: &str) -> Result<Option<StoredCredentials>, AuthError>;
    fn save(&self, profile: &str, credentials: &StoredCredentials) -> Result<(), AuthError>;
    fn clear(&self, profile: &str) -> Result<(), AuthError>;
}

/// Token pair plus the user it was issued to, as persisted on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub tokens: TokenPair,
    pub user: Option<AuthUser>,
}

/// Configuration for file-backed credential storage.
#[derive(Debug, Clone)]
pub struct TokenStoreConfig {
    pub base_dir: PathBuf,
}

impl TokenStoreConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_dir() -> PathBuf {
        default_tglogin_dir()
    }
}

/// File-backed credential store using TOML files, one per profile.
///
/// # Example
/// ```no_run
/// use tglogin::token::TokenPair;
/// use tglogin::token_store::{FileTokenStore, StoredCredentials, TokenStore};
///
/// let store = FileTokenStore::new_default();
/// let credentials = StoredCredentials {
///     tokens: TokenPair {
///         access_token: "access".to_string(),
///         refresh_token: Some("refresh".to_string()),
///         expires_at: None,
///     },
///     user: None,
/// };
/// store.save("default", &credentials)?;
/// # Ok::<(), tglogin::error::AuthError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    base_dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(config: TokenStoreConfig) -> Self {
        Self {
            base_dir: config.base_dir,
        }
    }

    pub fn new_default() -> Self {
        Self {
            base_dir: default_tglogin_dir(),
        }
    }

    fn credentials_path(&self, profile: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.toml", normalize_label(profile)))
    }

    fn ensure_parent(path: &Path) -> Result<(), AuthError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self, profile: &str) -> Result<Option<StoredCredentials>, AuthError> {
        let path = self.credentials_path(profile);
        let raw = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AuthError::Io(err.to_string())),
        };
        let file: CredentialsFile = toml::from_str(&raw)?;
        Ok(Some(file.credentials))
    }

    fn save(&self, profile: &str, credentials: &StoredCredentials) -> Result<(), AuthError> {
        let path = self.credentials_path(profile);
        Self::ensure_parent(&path)?;
        let file = CredentialsFile {
            version: 1,
            profile: profile.to_string(),
            credentials: credentials.clone(),
            saved_at: Utc::now(),
        };
        let serialized = toml::to_string(&file)?;
        fs::write(&path, serialized)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn clear(&self, profile: &str) -> Result<(), AuthError> {
        let path = self.credentials_path(profile);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::Io(err.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialsFile {
    version: u32,
    profile: String,
    credentials: StoredCredentials,
    saved_at: DateTime<Utc>,
}

fn default_tglogin_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".tglogin"))
        .unwrap_or_else(|| PathBuf::from(".tglogin"))
}

fn normalize_label(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "default".to_string();
    }
    let mut out = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() || lower == '-' {
            out.push(lower);
        } else {
            out.push('-');
        }
    }
    if out.trim_matches('-').is_empty() {
        "default".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, FileTokenStore) {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(TokenStoreConfig::new(dir.path().to_path_buf()));
        (dir, store)
    }

    fn credentials(access: &str) -> StoredCredentials {
        StoredCredentials {
            tokens: TokenPair {
                access_token: access.to_string(),
                refresh_token: Some("refresh".to_string()),
                expires_at: None,
            },
            user: None,
        }
    }

    #[test]
    fn credentials_round_trip_works() {
        let (_dir, store) = temp_store();
        store.save("default", &credentials("access")).unwrap();
        let loaded = store.load("default").unwrap().unwrap();
        assert_eq!(loaded.tokens.access_token, "access");
        assert_eq!(loaded.tokens.refresh_token.as_deref(), Some("refresh"));
    }

    #[test]
    fn load_missing_profile_returns_none() {
        let (_dir, store) = temp_store();
        assert!(store.load("nobody").unwrap().is_none());
    }

    #[test]
    fn clear_removes_credentials() {
        let (_dir, store) = temp_store();
        store.save("default", &credentials("access")).unwrap();
        store.clear("default").unwrap();
        assert!(store.load("default").unwrap().is_none());
    }

    #[test]
    fn clear_is_idempotent() {
        let (_dir, store) = temp_store();
        store.clear("default").unwrap();
        store.clear("default").unwrap();
    }

    #[test]
    fn profile_labels_are_normalized() {
        let (_dir, store) = temp_store();
        assert!(store
            .credentials_path("My Profile!")
            .to_string_lossy()
            .ends_with("my-profile-.toml"));
        assert!(store
            .credentials_path("")
            .to_string_lossy()
            .ends_with("default.toml"));
    }
}
