//! Persistence for the session's token pair.
//!
//! A `TokenStore` holds at most one `TokenPair`. Stores do not validate the
//! tokens they hold; they only guarantee that the pair is written, read and
//! removed as a unit.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use keyring::Entry;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use super::sealed::{self, SealedRecord};
use super::tokens::TokenPair;

/// Keyring service name. The account is the API origin.
const SERVICE_NAME: &str = "taskdesk";

/// Token file name inside the per-origin directory
const TOKEN_FILE: &str = "tokens.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored tokens are unreadable: {0}")]
    Corrupt(String),

    #[error("stored tokens could not be decrypted")]
    Decrypt,

    #[error("encryption failed: {0}")]
    Encrypt(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Corrupt(error.to_string())
    }
}

/// Storage abstraction for the persisted token pair.
pub trait TokenStore: Send + Sync {
    fn save(&self, pair: &TokenPair) -> Result<(), StoreError>;
    fn load(&self) -> Result<Option<TokenPair>, StoreError>;
    /// Remove the stored pair. Clearing an empty store succeeds.
    fn clear(&self) -> Result<(), StoreError>;
}

/// In-process store, lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    pair: Mutex<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: TokenPair) -> Self {
        Self {
            pair: Mutex::new(Some(pair)),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<TokenPair>> {
        // A poisoned lock still holds a whole pair, never half of one
        self.pair.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TokenStore for MemoryTokenStore {
    fn save(&self, pair: &TokenPair) -> Result<(), StoreError> {
        *self.slot() = Some(pair.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<TokenPair>, StoreError> {
        Ok(self.slot().clone())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.slot() = None;
        Ok(())
    }
}

/// OS keychain store. The pair is serialized into a single secret so both
/// tokens are always replaced together.
pub struct KeyringTokenStore {
    origin: String,
    entry: Entry,
}

impl KeyringTokenStore {
    pub fn new(origin: impl Into<String>) -> Result<Self, StoreError> {
        let origin = origin.into();
        let entry = Entry::new(SERVICE_NAME, &origin)?;
        Ok(Self { origin, entry })
    }
}

impl TokenStore for KeyringTokenStore {
    fn save(&self, pair: &TokenPair) -> Result<(), StoreError> {
        let secret = serde_json::to_string(pair)?;
        self.entry.set_password(&secret)?;
        debug!(origin = %self.origin, "Saved tokens to keychain");
        Ok(())
    }

    fn load(&self) -> Result<Option<TokenPair>, StoreError> {
        match self.entry.get_password() {
            Ok(secret) => Ok(Some(serde_json::from_str(&secret)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> Result<(), StoreError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                debug!(origin = %self.origin, "Cleared tokens from keychain");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// File store under a per-origin directory, optionally sealed with a
/// passphrase.
pub struct FileTokenStore {
    dir: PathBuf,
    passphrase: Option<String>,
}

impl FileTokenStore {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            passphrase: None,
        }
    }

    /// Encrypt the pair at rest with a key derived from `passphrase`.
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Directory for `origin` under `base`, e.g. `https://api.example.com`
    /// becomes `base/https_api.example.com`.
    pub fn origin_dir(base: &Path, origin: &str) -> PathBuf {
        let label: String = origin
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        let label = label.split('_').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("_");
        base.join(label)
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(TOKEN_FILE)
    }

    fn encode(&self, pair: &TokenPair) -> Result<String, StoreError> {
        let plain = serde_json::to_vec(pair)?;
        match self.passphrase {
            Some(ref passphrase) => {
                let record = sealed::seal(passphrase, &plain)?;
                Ok(serde_json::to_string_pretty(&record)?)
            }
            None => Ok(String::from_utf8_lossy(&plain).into_owned()),
        }
    }

    fn decode(&self, contents: &str) -> Result<TokenPair, StoreError> {
        match self.passphrase {
            Some(ref passphrase) => {
                let record: SealedRecord = serde_json::from_str(contents)?;
                let plain = sealed::open(passphrase, &record)?;
                Ok(serde_json::from_slice(&plain)?)
            }
            None => Ok(serde_json::from_str(contents)?),
        }
    }
}

impl TokenStore for FileTokenStore {
    fn save(&self, pair: &TokenPair) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let contents = self.encode(pair)?;

        // Unique temp file, created 0600 on unix, renamed over the old pair
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path()).map_err(|e| e.error)?;
        debug!(path = ?self.path(), sealed = self.passphrase.is_some(), "Saved tokens to file");
        Ok(())
    }

    fn load(&self) -> Result<Option<TokenPair>, StoreError> {
        let contents = match fs::read_to_string(self.path()) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.decode(&contents).map(Some)
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> TokenPair {
        TokenPair::new("access-1", "refresh-1")
    }

    #[test]
    fn test_memory_store_round_trip_and_clear() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.load().unwrap(), None);

        store.save(&pair()).unwrap();
        assert_eq!(store.load().unwrap(), Some(pair()));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        FileTokenStore::new(dir.path().to_path_buf()).save(&pair()).unwrap();

        let reopened = FileTokenStore::new(dir.path().to_path_buf());
        assert_eq!(reopened.load().unwrap(), Some(pair()));

        let raw = fs::read_to_string(reopened.path()).unwrap();
        assert!(raw.contains("\"access_token\""));
        assert!(raw.contains("\"refresh_token\""));
    }

    #[test]
    fn test_file_store_clear_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("never-created"));
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn test_sealed_file_store_hides_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().to_path_buf()).with_passphrase("hunter2");
        store.save(&pair()).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("access-1"));
        assert_eq!(store.load().unwrap(), Some(pair()));

        let wrong = FileTokenStore::new(dir.path().to_path_buf()).with_passphrase("guess");
        assert!(matches!(wrong.load(), Err(StoreError::Decrypt)));
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().to_path_buf());
        fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.load(), Err(StoreError::Corrupt(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().to_path_buf());
        store.save(&pair()).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_file_store_concurrent_saves_leave_one_whole_pair() {
        let dir = tempfile::tempdir().unwrap();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let dir = dir.path().to_path_buf();
                std::thread::spawn(move || {
                    let store = FileTokenStore::new(dir);
                    for round in 0..10 {
                        let tag = format!("{}-{}", i, round);
                        let pair = TokenPair::new(format!("a{}", tag), format!("r{}", tag));
                        store.save(&pair).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let store = FileTokenStore::new(dir.path().to_path_buf());
        let pair = store.load().unwrap().expect("a pair");
        assert_eq!(pair.access.trim_start_matches('a'), pair.refresh.trim_start_matches('r'));

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|name| name != TOKEN_FILE)
            .collect();
        assert!(leftovers.is_empty(), "stray files: {:?}", leftovers);
    }

    #[test]
    fn test_keyring_store_reopens_saved_pair() {
        keychain::install();

        let store = KeyringTokenStore::new("https://keyring.example.com").unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.save(&pair()).unwrap();
        assert_eq!(store.load().unwrap(), Some(pair()));

        let reopened = KeyringTokenStore::new("https://keyring.example.com").unwrap();
        assert_eq!(reopened.load().unwrap(), Some(pair()));

        let other_origin = KeyringTokenStore::new("https://other.example.com").unwrap();
        assert_eq!(other_origin.load().unwrap(), None);

        reopened.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    /// Process-wide credential builder whose entries share one map, the way
    /// an OS keychain outlives the `Entry` handles pointing into it.
    mod keychain {
        use std::any::Any;
        use std::collections::HashMap;
        use std::sync::{Arc, Mutex, Once};

        use keyring::credential::{Credential, CredentialApi, CredentialBuilderApi};

        type Secrets = Arc<Mutex<HashMap<(String, String), Vec<u8>>>>;

        struct SharedCredential {
            key: (String, String),
            secrets: Secrets,
        }

        impl CredentialApi for SharedCredential {
            fn set_secret(&self, secret: &[u8]) -> keyring::Result<()> {
                self.secrets.lock().unwrap().insert(self.key.clone(), secret.to_vec());
                Ok(())
            }

            fn get_secret(&self) -> keyring::Result<Vec<u8>> {
                self.secrets
                    .lock()
                    .unwrap()
                    .get(&self.key)
                    .cloned()
                    .ok_or(keyring::Error::NoEntry)
            }

            fn delete_credential(&self) -> keyring::Result<()> {
                self.secrets
                    .lock()
                    .unwrap()
                    .remove(&self.key)
                    .map(|_| ())
                    .ok_or(keyring::Error::NoEntry)
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }

        struct SharedBuilder {
            secrets: Secrets,
        }

        impl CredentialBuilderApi for SharedBuilder {
            fn build(
                &self,
                _target: Option<&str>,
                service: &str,
                user: &str,
            ) -> keyring::Result<Box<Credential>> {
                Ok(Box::new(SharedCredential {
                    key: (service.to_string(), user.to_string()),
                    secrets: Arc::clone(&self.secrets),
                }))
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }

        pub fn install() {
            static INSTALL: Once = Once::new();
            INSTALL.call_once(|| {
                keyring::set_default_credential_builder(Box::new(SharedBuilder {
                    secrets: Secrets::default(),
                }));
            });
        }
    }

    #[test]
    fn test_origin_dir_label() {
        let dir = FileTokenStore::origin_dir(Path::new("/data"), "https://api.example.com:8443");
        assert_eq!(dir, PathBuf::from("/data/https_api.example.com_8443"));
    }
}
