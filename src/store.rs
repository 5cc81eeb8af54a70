//! Cached data access token.
//!
//! The data hub hands out access tokens that live for 24 hours. We treat them
//! as stale a little earlier so a long run never starts with a token that is
//! about to expire.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// How long a cached access token is used before a new one is requested.
pub const TOKEN_TTL: TimeDelta = TimeDelta::hours(22);

const FORMAT_VERSION: u32 = 1;

/// A short-lived access token and the moment it was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub issued_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            issued_at,
        }
    }
}

/// `true` while `now - issued_at` is below [`TOKEN_TTL`].
pub fn is_fresh(credential: &Credential, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(credential.issued_at) < TOKEN_TTL
}

pub trait CredentialStore {
    fn load(&self) -> Result<Option<Credential>>;
    fn save(&mut self, credential: &Credential) -> Result<()>;
    /// Forgets any cached credential.
    fn clear(&mut self) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCredential {
    version: u32,
    access_token: String,
    issued_at: DateTime<Utc>,
}

/// Keeps the credential in a small versioned JSON file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// `<cache dir>/elsync/access_token.json`, or the working directory if the
    /// platform has no cache dir.
    pub fn default_path() -> PathBuf {
        dirs::cache_dir()
            .map(|dir| dir.join("elsync"))
            .unwrap_or_default()
            .join("access_token.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn store_error(&self, message: impl Into<String>) -> Error {
        Error::Store {
            path: self.path.clone(),
            message: message.into(),
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)
            .map_err(|e| self.store_error(format!("failed to read: {e}")))?;

        // A cache we cannot understand is as good as no cache.
        let stored: StoredCredential = match serde_json::from_str(&text) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable token cache");
                return Ok(None);
            }
        };
        if stored.version != FORMAT_VERSION {
            warn!(
                path = %self.path.display(),
                version = stored.version,
                "ignoring token cache with unknown format version"
            );
            return Ok(None);
        }

        Ok(Some(Credential {
            access_token: stored.access_token,
            issued_at: stored.issued_at,
        }))
    }

    fn save(&mut self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    self.store_error(format!(
                        "failed to create directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let stored = StoredCredential {
            version: FORMAT_VERSION,
            access_token: credential.access_token.clone(),
            issued_at: credential.issued_at,
        };
        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| self.store_error(format!("failed to serialize: {e}")))?;
        fs::write(&self.path, json).map_err(|e| self.store_error(format!("failed to write: {e}")))
    }

    fn clear(&mut self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.store_error(format!("failed to remove: {e}"))),
        }
    }
}

/// Process-local store, for runs that must not touch the disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    credential: Option<Credential>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: Some(credential),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        Ok(self.credential.clone())
    }

    fn save(&mut self, credential: &Credential) -> Result<()> {
        self.credential = Some(credential.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.credential = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn issued() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn freshness_boundary() {
        let credential = Credential::new("tok", issued());
        assert!(is_fresh(&credential, issued()));
        assert!(is_fresh(&credential, issued() + TimeDelta::hours(21)));
        assert!(!is_fresh(&credential, issued() + TOKEN_TTL));
        assert!(!is_fresh(&credential, issued() + TimeDelta::days(3)));
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileCredentialStore::new(dir.path().join("nested/token.json"));

        assert_eq!(store.load().unwrap(), None);
        let credential = Credential::new("abc", issued());
        store.save(&credential).unwrap();
        assert_eq!(store.load().unwrap(), Some(credential));

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("\"version\": 1"));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn unknown_version_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(
            &path,
            r#"{"version": 7, "access_token": "x", "issued_at": "2024-03-01T08:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(FileCredentialStore::new(&path).load().unwrap(), None);
    }

    #[test]
    fn garbage_cache_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "not json at all").unwrap();
        assert_eq!(FileCredentialStore::new(&path).load().unwrap(), None);
    }

    #[test]
    fn memory_store() {
        let mut store = MemoryCredentialStore::new();
        assert_eq!(store.load().unwrap(), None);
        store.save(&Credential::new("a", issued())).unwrap();
        assert_eq!(store.load().unwrap().unwrap().access_token, "a");
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }
}
