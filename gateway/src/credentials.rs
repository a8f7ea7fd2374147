//! Durable storage for the access/refresh credential pair.
//!
//! SYSTEM CONTEXT
//! ==============
//! Login, refresh and logout all write here; the gateway reads the access
//! token on every dispatch and the session reads the refresh token when a
//! request comes back 401.
//!
//! DESIGN
//! ======
//! Each token is stored as an entry with an explicit expiry plus transport
//! attributes (`secure`, `same_site`), mirroring how the web front ends keep
//! them in cookies. Writers always replace or remove both entries in one
//! operation, and readers take both entries in one read, so nobody observes
//! a pair where only one half was updated.

#[cfg(test)]
#[path = "credentials_test.rs"]
mod tests;

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::claims::decode_access_claims;

pub const ACCESS_KEY: &str = "access";
pub const REFRESH_KEY: &str = "refresh";

const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(7 * 60);
const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const DEFAULT_EXPIRY_SKEW: Duration = Duration::from_secs(5);

// =============================================================================
// TYPES
// =============================================================================

/// Bearer tokens issued together by login or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access: String,
    pub refresh: String,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self { access: access.into(), refresh: refresh.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// One persisted token with its expiry and transport attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub value: String,
    /// Unix seconds after which the entry is treated as absent.
    pub expires_at: i64,
    /// Only send over `https` (loopback hosts excepted).
    pub secure: bool,
    pub same_site: SameSite,
}

impl StoredCredential {
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Both entries as read or written in a single operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialEntries {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<StoredCredential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<StoredCredential>,
}

impl CredentialEntries {
    /// Drop entries whose expiry has passed.
    #[must_use]
    pub fn unexpired_at(self, now: i64) -> Self {
        let keep = |entry: Option<StoredCredential>| entry.filter(|e| !e.is_expired_at(now));
        Self { access: keep(self.access), refresh: keep(self.refresh) }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&StoredCredential> {
        match key {
            ACCESS_KEY => self.access.as_ref(),
            REFRESH_KEY => self.refresh.as_ref(),
            _ => None,
        }
    }

    /// The pair, only when both halves are present.
    #[must_use]
    pub fn pair(&self) -> Option<CredentialPair> {
        let access = self.access.as_ref()?;
        let refresh = self.refresh.as_ref()?;
        Some(CredentialPair::new(access.value.clone(), refresh.value.clone()))
    }
}

/// Expiry and attribute policy applied when a pair is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialPolicy {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Subtracted from the token's own `exp` so the entry lapses first.
    pub expiry_skew: Duration,
    pub secure: bool,
    pub same_site: SameSite,
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        Self {
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            expiry_skew: DEFAULT_EXPIRY_SKEW,
            secure: true,
            same_site: SameSite::Strict,
        }
    }
}

impl CredentialPolicy {
    /// Build the persisted entries for `pair` as of `now` (unix seconds).
    ///
    /// The access entry never outlives the token's own `exp` claim.
    #[must_use]
    pub fn entries_for(&self, pair: &CredentialPair, now: i64) -> CredentialEntries {
        let mut access_expires = now.saturating_add(secs(self.access_ttl));
        if let Some(exp) = decode_access_claims(&pair.access).ok().and_then(|c| c.exp) {
            access_expires = access_expires.min(exp.saturating_sub(secs(self.expiry_skew)));
        }
        let refresh_expires = now.saturating_add(secs(self.refresh_ttl));

        CredentialEntries {
            access: Some(self.entry(&pair.access, access_expires)),
            refresh: Some(self.entry(&pair.refresh, refresh_expires)),
        }
    }

    fn entry(&self, value: &str, expires_at: i64) -> StoredCredential {
        StoredCredential { value: value.to_owned(), expires_at, secure: self.secure, same_site: self.same_site }
    }
}

fn secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

/// Current time as unix seconds.
#[must_use]
pub fn now_secs() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("credential file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Persistence for the credential pair.
pub trait CredentialStore: Send + Sync {
    /// Read both entries in one operation, expired ones included.
    fn read_entries(&self) -> CredentialEntries;

    /// Replace both entries with `pair`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backing medium cannot be written.
    fn store_pair(&self, pair: &CredentialPair) -> Result<(), StoreError>;

    /// Remove both entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backing medium cannot be written.
    fn clear(&self) -> Result<(), StoreError>;

    /// Unexpired entries as of now.
    fn entries(&self) -> CredentialEntries {
        self.read_entries().unexpired_at(now_secs())
    }

    fn access_token(&self) -> Option<String> {
        self.entries().access.map(|e| e.value)
    }

    fn refresh_token(&self) -> Option<String> {
        self.entries().refresh.map(|e| e.value)
    }

    fn load_pair(&self) -> Option<CredentialPair> {
        self.entries().pair()
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    policy: CredentialPolicy,
    entries: Mutex<CredentialEntries>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new(policy: CredentialPolicy) -> Self {
        Self { policy, entries: Mutex::new(CredentialEntries::default()) }
    }

    /// Seed the store with raw entries (expired ones included).
    #[must_use]
    pub fn with_entries(policy: CredentialPolicy, entries: CredentialEntries) -> Self {
        Self { policy, entries: Mutex::new(entries) }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn read_entries(&self) -> CredentialEntries {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn store_pair(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        let next = self.policy.entries_for(pair, now_secs());
        *self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = next;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = CredentialEntries::default();
        Ok(())
    }
}

// =============================================================================
// FILE STORE
// =============================================================================

/// JSON file holding both entries; survives restarts.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// crash mid-write leaves the previous pair intact.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    policy: CredentialPolicy,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>, policy: CredentialPolicy) -> Self {
        Self { path: path.into(), policy, lock: Mutex::new(()) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_entries(&self, entries: &CredentialEntries) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_vec_pretty(entries)?;
        let temp = self.temp_path();
        {
            let mut file = open_private(&temp)?;
            file.write_all(&raw)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new().write(true).create(true).truncate(true).open(path)
}

impl CredentialStore for FileCredentialStore {
    fn read_entries(&self) -> CredentialEntries {
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CredentialEntries::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "credentials: read failed");
                return CredentialEntries::default();
            }
        };
        serde_json::from_slice(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "credentials: ignoring corrupt file");
            CredentialEntries::default()
        })
    }

    fn store_pair(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.write_entries(&self.policy.entries_for(pair, now_secs()))
    }

    fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
