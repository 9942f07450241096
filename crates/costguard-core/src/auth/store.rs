//! Persisted token storage.
//!
//! Three independent string slots hold the access token, the refresh token
//! and the serialized user. Only the session manager writes them.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::warn;

use crate::models::UserProfile;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Token store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Failed to serialize user: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Token store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenSlot {
    AccessToken,
    RefreshToken,
    User,
}

impl TokenSlot {
    pub const ALL: [TokenSlot; 3] = [TokenSlot::AccessToken, TokenSlot::RefreshToken, TokenSlot::User];

    /// Storage key, shared with the web dashboard's local storage layout.
    pub fn key(&self) -> &'static str {
        match self {
            TokenSlot::AccessToken => "authToken",
            TokenSlot::RefreshToken => "refreshToken",
            TokenSlot::User => "user",
        }
    }

    fn file_name(&self) -> &'static str {
        match self {
            TokenSlot::AccessToken => "auth_token",
            TokenSlot::RefreshToken => "refresh_token",
            TokenSlot::User => "user.json",
        }
    }
}

pub trait TokenStore: Send + Sync {
    fn get(&self, slot: TokenSlot) -> Result<Option<String>, StoreError>;

    fn set(&self, slot: TokenSlot, value: &str) -> Result<(), StoreError>;

    /// Removing an absent slot is not an error.
    fn remove(&self, slot: TokenSlot) -> Result<(), StoreError>;

    fn clear(&self) -> Result<(), StoreError> {
        for slot in TokenSlot::ALL {
            self.remove(slot)?;
        }
        Ok(())
    }

    /// Slot value, with empty strings treated as absent.
    fn get_present(&self, slot: TokenSlot) -> Result<Option<String>, StoreError> {
        Ok(self.get(slot)?.filter(|v| !v.is_empty()))
    }

    /// Stored user, or `None` if missing or unparseable.
    fn user(&self) -> Result<Option<UserProfile>, StoreError> {
        let Some(raw) = self.get_present(TokenSlot::User)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                warn!(error = %e, "Stored user is not valid JSON, ignoring");
                Ok(None)
            }
        }
    }

    fn set_user(&self, user: &UserProfile) -> Result<(), StoreError> {
        let json = serde_json::to_string(user)?;
        self.set(TokenSlot::User, &json)
    }
}

/// In-memory store for tests and sessions that must not touch disk.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slots: Mutex<HashMap<TokenSlot, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().map(|s| s.is_empty()).unwrap_or(true)
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, slot: TokenSlot) -> Result<Option<String>, StoreError> {
        let slots = self.slots.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(slots.get(&slot).cloned())
    }

    fn set(&self, slot: TokenSlot, value: &str) -> Result<(), StoreError> {
        let mut slots = self.slots.lock().map_err(|_| StoreError::Poisoned)?;
        slots.insert(slot, value.to_string());
        Ok(())
    }

    fn remove(&self, slot: TokenSlot) -> Result<(), StoreError> {
        let mut slots = self.slots.lock().map_err(|_| StoreError::Poisoned)?;
        slots.remove(&slot);
        Ok(())
    }
}

/// One file per slot under a directory, readable only by the owner.
pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, slot: TokenSlot) -> PathBuf {
        self.dir.join(slot.file_name())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, slot: TokenSlot) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.slot_path(slot)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, slot: TokenSlot, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.slot_path(slot);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&path)?;
            file.write_all(value.as_bytes())?;
        }

        #[cfg(not(unix))]
        {
            let mut file = fs::File::create(&path)?;
            file.write_all(value.as_bytes())?;
        }

        Ok(())
    }

    fn remove(&self, slot: TokenSlot) -> Result<(), StoreError> {
        match fs::remove_file(self.slot_path(slot)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_slots_are_independent() {
        let store = MemoryTokenStore::new();
        store.set(TokenSlot::AccessToken, "t1").unwrap();
        assert_eq!(store.get(TokenSlot::AccessToken).unwrap().as_deref(), Some("t1"));
        assert_eq!(store.get(TokenSlot::RefreshToken).unwrap(), None);

        store.remove(TokenSlot::AccessToken).unwrap();
        store.remove(TokenSlot::AccessToken).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_user_round_trip_and_corruption() {
        let store = MemoryTokenStore::new();
        let user = UserProfile {
            user_id: "u1".into(),
            email: "a@b.com".into(),
            ..Default::default()
        };
        store.set_user(&user).unwrap();
        assert_eq!(store.user().unwrap(), Some(user));

        store.set(TokenSlot::User, "{not json").unwrap();
        assert_eq!(store.user().unwrap(), None);
    }

    #[test]
    fn test_empty_values_count_as_absent() {
        let store = MemoryTokenStore::new();
        store.set(TokenSlot::AccessToken, "").unwrap();
        assert_eq!(store.get_present(TokenSlot::AccessToken).unwrap(), None);
        assert_eq!(store.get(TokenSlot::AccessToken).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_file_store_persists_and_clears() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("session"));

        assert_eq!(store.get(TokenSlot::AccessToken).unwrap(), None);
        store.set(TokenSlot::AccessToken, "t1").unwrap();
        store.set(TokenSlot::RefreshToken, "r1").unwrap();

        let reopened = FileTokenStore::new(dir.path().join("session"));
        assert_eq!(reopened.get(TokenSlot::AccessToken).unwrap().as_deref(), Some("t1"));
        assert_eq!(reopened.get(TokenSlot::RefreshToken).unwrap().as_deref(), Some("r1"));

        reopened.clear().unwrap();
        for slot in TokenSlot::ALL {
            assert_eq!(store.get(slot).unwrap(), None);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().to_path_buf());
        store.set(TokenSlot::RefreshToken, "r1").unwrap();

        let mode = fs::metadata(dir.path().join("refresh_token")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
