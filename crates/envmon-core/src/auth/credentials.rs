//! Persistence for the bearer credential.
//!
//! A `TokenStore` never fails from the caller's point of view: storage that
//! is missing, unreadable or corrupt reads back as "no credential", and a
//! failed write or delete is logged and otherwise ignored.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::Credential;

/// Fixed name of the single token entry, in every backend
pub const TOKEN_ENTRY: &str = "token";

/// Keychain service name
const SERVICE_NAME: &str = "envmon";

pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<Credential>;
    fn save(&self, credential: &Credential);
    fn clear(&self);
}

// ============================================================================
// File
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct TokenRecord {
    token: String,
    saved_at: DateTime<Utc>,
}

/// Stores the token as `token.json` inside a directory (normally the
/// cache dir).
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", TOKEN_ENTRY)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn try_load(&self) -> Result<Option<Credential>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)
            .context("Failed to read token file")?;
        let record: TokenRecord = serde_json::from_str(&contents)
            .context("Failed to parse token file")?;
        debug!(saved_at = %record.saved_at, "Loaded persisted token");
        let credential = Credential::new(record.token);
        Ok((!credential.is_empty()).then_some(credential))
    }

    fn try_save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create token directory")?;
        }
        let record = TokenRecord {
            token: credential.as_str().to_string(),
            saved_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&record)?;
        std::fs::write(&self.path, contents).context("Failed to write token file")?;
        Ok(())
    }

    fn try_clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove token file")?;
        }
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<Credential> {
        self.try_load().unwrap_or_else(|e| {
            warn!(error = %e, path = %self.path.display(), "Ignoring unreadable token file");
            None
        })
    }

    fn save(&self, credential: &Credential) {
        if let Err(e) = self.try_save(credential) {
            warn!(error = %e, "Failed to persist token");
        }
    }

    fn clear(&self) {
        if let Err(e) = self.try_clear() {
            warn!(error = %e, "Failed to clear persisted token");
        }
    }
}

// ============================================================================
// OS keychain
// ============================================================================

pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, TOKEN_ENTRY).context("Failed to create keyring entry")
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringTokenStore {
    fn load(&self) -> Option<Credential> {
        let entry = match self.entry() {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Keychain unavailable");
                return None;
            }
        };
        match entry.get_password() {
            Ok(token) => Some(Credential::new(token)).filter(|c| !c.is_empty()),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read token from keychain");
                None
            }
        }
    }

    fn save(&self, credential: &Credential) {
        let result = self.entry().and_then(|entry| {
            entry
                .set_password(credential.as_str())
                .context("Failed to store token in keychain")
        });
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist token");
        }
    }

    fn clear(&self) {
        let result = self.entry().and_then(|entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        });
        if let Err(e) = result {
            warn!(error = %e, "Failed to clear persisted token");
        }
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local store; nothing survives a restart.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<Credential>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(credential: Credential) -> Self {
        Self {
            token: Mutex::new(Some(credential)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<Credential> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, credential: &Credential) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
    }

    fn clear(&self) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
