//! Credential store: users, password hashes, public keys, and the
//! server-wide symmetric key, persisted together in one JSON file.
//!
//! ## Persistence
//!
//! Every mutation rewrites the whole file via write-to-temp + fsync +
//! rename, so a crash leaves either the old or the new file, never a torn
//! one. Writers are serialized by a single mutex and the in-memory copy is
//! swapped only after the durable write succeeds; readers therefore see the
//! old or the fully-updated state.
//!
//! ## File format
//!
//! ```json
//! {
//!   "users": {
//!     "Node1": { "password_hash": "$argon2id$...", "public_key_pem": "" }
//!   },
//!   "symmetric_key": "<64 hex chars>"
//! }
//! ```
//!
//! Legacy files with a plaintext `password` field (and `api_secret_key`
//! instead of `symmetric_key`) are migrated on load.

use crate::config::{SeedUser, StoreConfig};
use crate::error::{StoreError, StoreResult};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use relay_crypto::SymmetricKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use zeroize::Zeroizing;

/// A persisted user record.
#[derive(Clone, Default, Serialize, Deserialize)]
struct UserRecord {
    /// Argon2id PHC string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password_hash: Option<String>,
    /// Legacy plaintext password; read for migration, never written back.
    #[serde(default, skip_serializing)]
    password: Option<String>,
    /// PEM public key; empty when none has been registered.
    #[serde(default)]
    public_key_pem: String,
}

/// On-disk layout.
#[derive(Serialize, Deserialize)]
struct StoreFile {
    users: BTreeMap<String, UserRecord>,
    #[serde(alias = "api_secret_key")]
    symmetric_key: String,
}

/// Durable username → credential mapping plus the server-wide key.
pub struct CredentialStore {
    path: PathBuf,
    users: RwLock<BTreeMap<String, UserRecord>>,
    write_lock: Mutex<()>,
    key: SymmetricKey,
    /// Verified against for unknown usernames so lookups cost the same.
    dummy_hash: String,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("path", &self.path)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Load the store at `config.path`, creating and seeding it on first boot.
    ///
    /// This is blocking (file I/O and password hashing); call it from
    /// `spawn_blocking` when a runtime is active.
    ///
    /// # Errors
    ///
    /// Any read, parse, key, or write failure. Callers treat this as fatal.
    pub fn load(config: &StoreConfig) -> StoreResult<Self> {
        let hasher = build_hasher(config)?;
        let path = config.path.clone();

        let (users, key) = if path.exists() {
            let (mut users, key) = read_store(&path)?;
            if migrate_legacy(&hasher, &mut users)? {
                tracing::info!("Migrated plaintext passwords in {}", path.display());
                write_atomic(&path, &encode(&path, &users, &key)?)?;
            }
            (users, key)
        } else {
            let key = SymmetricKey::generate().map_err(StoreError::InvalidKey)?;
            let users = seed(&hasher, &config.seed_users)?;
            write_atomic(&path, &encode(&path, &users, &key)?)?;
            tracing::info!(
                "Created credential store {} with {} seed users",
                path.display(),
                users.len()
            );
            (users, key)
        };

        let dummy = Zeroizing::new(uuid::Uuid::new_v4().to_string());
        let dummy_hash = hash_password(&hasher, &dummy)?;

        Ok(Self {
            path,
            users: RwLock::new(users),
            write_lock: Mutex::new(()),
            key,
            dummy_hash,
        })
    }

    /// Check `password` for `username`. Unknown users fail closed.
    pub async fn verify(&self, username: &str, password: &str) -> bool {
        let stored = self
            .users
            .read()
            .await
            .get(username)
            .and_then(|record| record.password_hash.clone());

        let known = stored.is_some();
        let hash = stored.unwrap_or_else(|| self.dummy_hash.clone());
        let password = Zeroizing::new(password.to_string());

        match tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await {
            Ok(matched) => known && matched,
            Err(e) => {
                tracing::error!("Password verification task failed: {}", e);
                false
            }
        }
    }

    /// Store (or replace) the public key for `username`, durably.
    ///
    /// # Errors
    ///
    /// `UnknownUser` if no record exists; I/O errors if the rewrite fails,
    /// in which case the in-memory state is left unchanged.
    pub async fn register_public_key(&self, username: &str, pem: &str) -> StoreResult<()> {
        let _writer = self.write_lock.lock().await;

        let mut users = self.users.read().await.clone();
        let record = users
            .get_mut(username)
            .ok_or_else(|| StoreError::UnknownUser {
                username: username.to_string(),
            })?;
        record.public_key_pem = pem.to_string();

        let bytes = encode(&self.path, &users, &self.key)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;

        *self.users.write().await = users;

        tracing::debug!("Persisted public key for {}", username);
        Ok(())
    }

    /// Registered public key for `username`, if any.
    pub async fn public_key(&self, username: &str) -> Option<String> {
        self.users
            .read()
            .await
            .get(username)
            .map(|record| record.public_key_pem.clone())
            .filter(|pem| !pem.is_empty())
    }

    /// Whether `username` has a record.
    pub async fn contains(&self, username: &str) -> bool {
        self.users.read().await.contains_key(username)
    }

    /// Number of user records.
    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    /// The server-wide symmetric key.
    pub fn symmetric_key(&self) -> &SymmetricKey {
        &self.key
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn build_hasher(config: &StoreConfig) -> StoreResult<Argon2<'static>> {
    let params = Params::new(config.kdf_memory_kib, config.kdf_iterations, 1, None)
        .map_err(|e| StoreError::Hash(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

fn hash_password(hasher: &Argon2<'_>, password: &str) -> StoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    hasher
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::Hash(e.to_string()))
}

/// Parameters come from the PHC string, so hashes made with older settings
/// still verify.
fn verify_password(password: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

fn seed(hasher: &Argon2<'_>, seeds: &[SeedUser]) -> StoreResult<BTreeMap<String, UserRecord>> {
    seeds
        .iter()
        .map(|user| -> StoreResult<(String, UserRecord)> {
            let record = UserRecord {
                password_hash: Some(hash_password(hasher, &user.password)?),
                ..UserRecord::default()
            };
            Ok((user.username.clone(), record))
        })
        .collect()
}

/// Hash any plaintext passwords in place. Returns whether anything changed.
fn migrate_legacy(
    hasher: &Argon2<'_>,
    users: &mut BTreeMap<String, UserRecord>,
) -> StoreResult<bool> {
    let mut changed = false;
    for (username, record) in users.iter_mut() {
        let legacy = record.password.take().map(Zeroizing::new);
        let hashed = record.password_hash.is_some();
        match (hashed, legacy) {
            (true, None) => {}
            (true, Some(_)) => changed = true,
            (false, Some(plain)) => {
                record.password_hash = Some(hash_password(hasher, &plain)?);
                changed = true;
            }
            (false, None) => {
                return Err(StoreError::MissingCredential {
                    username: username.clone(),
                })
            }
        }
    }
    Ok(changed)
}

fn read_store(path: &Path) -> StoreResult<(BTreeMap<String, UserRecord>, SymmetricKey)> {
    let content = std::fs::read_to_string(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let file: StoreFile = serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        source: e,
    })?;
    let key = SymmetricKey::from_hex(&file.symmetric_key).map_err(StoreError::InvalidKey)?;
    Ok((file.users, key))
}

fn encode(
    path: &Path,
    users: &BTreeMap<String, UserRecord>,
    key: &SymmetricKey,
) -> StoreResult<Vec<u8>> {
    let file = StoreFile {
        users: users.clone(),
        symmetric_key: key.to_hex().to_string(),
    };
    let mut bytes = serde_json::to_vec_pretty(&file).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        source: e,
    })?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Replace `path` with `bytes` atomically (temp file + fsync + rename).
fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp_path).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    std::fs::rename(&tmp_path, path).map_err(io_err)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = std::fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn test_config(path: PathBuf) -> StoreConfig {
        StoreConfig {
            path,
            kdf_memory_kib: 1024,
            kdf_iterations: 1,
            ..StoreConfig::default()
        }
    }

    #[tokio::test]
    async fn first_boot_seeds_and_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = CredentialStore::load(&test_config(path.clone())).unwrap();

        assert!(path.exists());
        assert_eq!(store.user_count().await, 2);
        assert!(store.verify("Node1", "secure_pass_node1").await);
        assert!(store.verify("Node2", "secure_pass_node2").await);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("secure_pass_node1"), "plaintext persisted");
        assert!(raw.contains("$argon2id$"));
    }

    #[tokio::test]
    async fn key_and_users_survive_restart() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path().join("store.json"));

        let first = CredentialStore::load(&config).unwrap();
        let key = first.symmetric_key().clone();
        drop(first);

        let second = CredentialStore::load(&config).unwrap();
        assert_eq!(second.symmetric_key(), &key);
        assert!(second.verify("Node1", "secure_pass_node1").await);
    }

    #[tokio::test]
    async fn verify_fails_closed() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::load(&test_config(dir.path().join("store.json"))).unwrap();

        assert!(!store.verify("Node1", "wrong").await);
        assert!(!store.verify("alice", "secure_pass_node1").await);
        assert!(!store.verify("", "").await);
    }

    #[tokio::test]
    async fn register_unknown_user_fails() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::load(&test_config(dir.path().join("store.json"))).unwrap();

        let result = store.register_public_key("alice", "pem").await;
        assert!(matches!(result, Err(StoreError::UnknownUser { username }) if username == "alice"));
        assert!(!store.contains("alice").await);
    }

    #[tokio::test]
    async fn register_persists_and_overwrites() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path().join("store.json"));
        let store = CredentialStore::load(&config).unwrap();

        assert_eq!(store.public_key("Node2").await, None);
        store.register_public_key("Node2", "first").await.unwrap();
        store.register_public_key("Node2", "second").await.unwrap();
        assert_eq!(store.public_key("Node2").await.as_deref(), Some("second"));

        let reloaded = CredentialStore::load(&config).unwrap();
        assert_eq!(reloaded.public_key("Node2").await.as_deref(), Some("second"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registrations_are_not_lost() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path().join("store.json"));
        let store = Arc::new(CredentialStore::load(&config).unwrap());

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.register_public_key("Node1", "key-one").await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.register_public_key("Node2", "key-two").await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let reloaded = CredentialStore::load(&config).unwrap();
        assert_eq!(reloaded.public_key("Node1").await.as_deref(), Some("key-one"));
        assert_eq!(reloaded.public_key("Node2").await.as_deref(), Some("key-two"));
    }

    #[tokio::test]
    async fn legacy_plaintext_store_is_migrated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("database.txt");
        let legacy = serde_json::json!({
            "users": {
                "Node1": {"password": "secure_pass_node1", "public_key_pem": ""},
                "Node2": {"password": "secure_pass_node2", "public_key_pem": "pem"}
            },
            "api_secret_key": "a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6e7f8a9b0c1d2e3f4a5b6c7d8e9f0a1b2"
        });
        std::fs::write(&path, legacy.to_string()).unwrap();

        let store = CredentialStore::load(&test_config(path.clone())).unwrap();
        assert!(store.verify("Node1", "secure_pass_node1").await);
        assert_eq!(store.public_key("Node2").await.as_deref(), Some("pem"));
        assert_eq!(
            store.symmetric_key().to_hex().as_str(),
            "a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6e7f8a9b0c1d2e3f4a5b6c7d8e9f0a1b2"
        );

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("secure_pass_node1"));
        assert!(raw.contains("symmetric_key"));
    }

    #[test]
    fn corrupt_store_refuses_to_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{\"users\": {").unwrap();

        assert!(matches!(
            CredentialStore::load(&test_config(path)),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn bad_key_refuses_to_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, r#"{"users": {}, "symmetric_key": "abcd"}"#).unwrap();

        assert!(matches!(
            CredentialStore::load(&test_config(path)),
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn record_without_credential_refuses_to_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let key = "00".repeat(32);
        std::fs::write(
            &path,
            format!(r#"{{"users": {{"ghost": {{}}}}, "symmetric_key": "{key}"}}"#),
        )
        .unwrap();

        assert!(matches!(
            CredentialStore::load(&test_config(path)),
            Err(StoreError::MissingCredential { username }) if username == "ghost"
        ));
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        write_atomic(&path, b"{}").unwrap();
        write_atomic(&path, b"{\"v\":2}").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"v\":2}");
        assert!(!dir.path().join("store.json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn store_file_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        CredentialStore::load(&test_config(path.clone())).unwrap();

        let perms = std::fs::metadata(&path).unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600, "store should be 0600");
    }
}
