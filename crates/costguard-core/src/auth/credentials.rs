use keyring::Entry;

use super::store::{StoreError, TokenSlot, TokenStore};

const SERVICE_NAME: &str = "costguard";

/// Token store backed by the OS keychain, one entry per slot.
pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a distinct keychain service, e.g. one per API environment.
    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, slot: TokenSlot) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, slot.key())?)
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self, slot: TokenSlot) -> Result<Option<String>, StoreError> {
        match self.entry(slot)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, slot: TokenSlot, value: &str) -> Result<(), StoreError> {
        self.entry(slot)?.set_password(value)?;
        Ok(())
    }

    fn remove(&self, slot: TokenSlot) -> Result<(), StoreError> {
        match self.entry(slot)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
