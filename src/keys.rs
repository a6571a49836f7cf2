/* src/keys.rs */

//! Per-user API keys for programmatic record management.
//!
//! The plaintext secret is handed out once, at creation. Only its SHA-256
//! digest is kept, which is enough to authenticate a presented key later.

use crate::error::KeyError;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use fancy_log::{LogLevel, log};
use parking_lot::{Mutex, RwLock};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub const MIN_LABEL_LEN: usize = 4;
const SECRET_BYTES: usize = 32;

/// A freshly created key. The only value that ever carries the secret.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKey {
    pub owner: String,
    pub label: String,
    pub secret: String,
    pub created_at: DateTime<Utc>,
}

/// What listing a user's keys shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyInfo {
    pub label: String,
    pub created_at: DateTime<Utc>,
}

/// Owner and label a presented secret belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyIdentity {
    pub owner: String,
    pub label: String,
}

#[derive(Debug)]
struct StoredKey {
    digest: [u8; 32],
    created_at: DateTime<Utc>,
}

type OwnerKeys = Arc<Mutex<BTreeMap<String, StoredKey>>>;

/// Keys partitioned by owner; each owner's keys sit behind their own lock.
///
/// `by_digest` is derived from the owner maps and only changed while the
/// owning owner's lock is held.
#[derive(Debug, Default)]
pub struct KeyStore {
    owners: RwLock<HashMap<String, OwnerKeys>>,
    by_digest: RwLock<HashMap<[u8; 32], KeyIdentity>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn owner_keys(&self, owner: &str) -> Option<OwnerKeys> {
        self.owners.read().get(owner).cloned()
    }

    pub fn create_key(&self, owner: &str, label: &str) -> Result<ApiKey, KeyError> {
        let label = label.trim();
        if label.chars().count() < MIN_LABEL_LEN {
            return Err(KeyError::InvalidLabel {
                label: label.to_string(),
                min: MIN_LABEL_LEN,
            });
        }

        let keys = self
            .owners
            .write()
            .entry(owner.to_string())
            .or_default()
            .clone();
        let mut keys = keys.lock();
        if keys.contains_key(label) {
            return Err(KeyError::DuplicateLabel(label.to_string()));
        }

        let secret = generate_secret();
        let created_at = Utc::now();
        let key_digest = digest(&secret);
        keys.insert(
            label.to_string(),
            StoredKey {
                digest: key_digest,
                created_at,
            },
        );
        self.by_digest.write().insert(
            key_digest,
            KeyIdentity {
                owner: owner.to_string(),
                label: label.to_string(),
            },
        );
        log(
            LogLevel::Info,
            &format!("Created API key {:?} for {}", label, owner),
        );

        Ok(ApiKey {
            owner: owner.to_string(),
            label: label.to_string(),
            secret,
            created_at,
        })
    }

    /// Keys of `owner`, ordered by label. Never includes secrets.
    pub fn list_keys(&self, owner: &str) -> Vec<KeyInfo> {
        match self.owner_keys(owner) {
            Some(keys) => keys
                .lock()
                .iter()
                .map(|(label, key)| KeyInfo {
                    label: label.clone(),
                    created_at: key.created_at,
                })
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn delete_key(&self, owner: &str, label: &str) -> Result<(), KeyError> {
        let label = label.trim();
        let keys = self
            .owner_keys(owner)
            .ok_or_else(|| KeyError::NotFound(label.to_string()))?;
        let mut keys = keys.lock();
        let removed = keys
            .remove(label)
            .ok_or_else(|| KeyError::NotFound(label.to_string()))?;
        self.by_digest.write().remove(&removed.digest);
        drop(keys);
        log(
            LogLevel::Info,
            &format!("Revoked API key {:?} of {}", label, owner),
        );
        Ok(())
    }

    /// Resolves a presented secret to the key it was issued as.
    pub fn authenticate(&self, secret: &str) -> Option<KeyIdentity> {
        self.by_digest.read().get(&digest(secret.trim())).cloned()
    }
}

fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn digest(secret: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(secret.as_bytes()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_returns_secret_once() {
        let store = KeyStore::new();
        let key = store.create_key("alice", "ci-deploy").unwrap();
        assert_eq!(key.owner, "alice");
        assert_eq!(key.label, "ci-deploy");
        // 32 bytes, unpadded base64url
        assert_eq!(key.secret.len(), 43);

        let listed = store.list_keys("alice");
        assert_eq!(
            listed,
            vec![KeyInfo {
                label: "ci-deploy".to_string(),
                created_at: key.created_at,
            }]
        );
    }

    #[test]
    fn test_secrets_are_unique() {
        let store = KeyStore::new();
        let a = store.create_key("alice", "first").unwrap();
        let b = store.create_key("alice", "second").unwrap();
        assert_ne!(a.secret, b.secret);
    }

    #[test]
    fn test_label_rules() {
        let store = KeyStore::new();
        assert!(matches!(
            store.create_key("alice", "abc"),
            Err(KeyError::InvalidLabel { .. })
        ));
        assert!(matches!(
            store.create_key("alice", "  ab  "),
            Err(KeyError::InvalidLabel { .. })
        ));
        assert!(store.create_key("alice", "abcd").is_ok());
    }

    #[test]
    fn test_labels_are_unique_per_owner() {
        let store = KeyStore::new();
        store.create_key("alice", "ci-deploy").unwrap();
        assert!(matches!(
            store.create_key("alice", "ci-deploy"),
            Err(KeyError::DuplicateLabel(_))
        ));
        assert!(store.create_key("bob", "ci-deploy").is_ok());
        assert_eq!(store.list_keys("alice").len(), 1);
        assert_eq!(store.list_keys("bob").len(), 1);
    }

    #[test]
    fn test_delete_is_not_idempotent() {
        let store = KeyStore::new();
        store.create_key("alice", "ci-deploy").unwrap();
        store.create_key("bob", "ci-deploy").unwrap();

        assert!(matches!(
            store.delete_key("alice", "missing"),
            Err(KeyError::NotFound(_))
        ));
        store.delete_key("alice", "ci-deploy").unwrap();
        assert!(matches!(
            store.delete_key("alice", "ci-deploy"),
            Err(KeyError::NotFound(_))
        ));
        assert!(store.list_keys("alice").is_empty());
        assert_eq!(store.list_keys("bob").len(), 1);
        assert!(matches!(
            store.delete_key("carol", "ci-deploy"),
            Err(KeyError::NotFound(_))
        ));
    }

    #[test]
    fn test_authenticate() {
        let store = KeyStore::new();
        let key = store.create_key("alice", "ci-deploy").unwrap();

        assert_eq!(
            store.authenticate(&key.secret),
            Some(KeyIdentity {
                owner: "alice".to_string(),
                label: "ci-deploy".to_string(),
            })
        );
        assert_eq!(store.authenticate("not-a-key"), None);

        store.delete_key("alice", "ci-deploy").unwrap();
        assert_eq!(store.authenticate(&key.secret), None);
    }

    #[test]
    fn test_authenticate_across_owners() {
        let store = KeyStore::new();
        let mut issued = Vec::new();
        for i in 0..50 {
            let owner = format!("user{}", i);
            issued.push(store.create_key(&owner, "ci-deploy").unwrap());
        }

        store.delete_key("user7", "ci-deploy").unwrap();
        for key in &issued {
            let found = store.authenticate(&key.secret);
            if key.owner == "user7" {
                assert_eq!(found, None);
            } else {
                assert_eq!(
                    found,
                    Some(KeyIdentity {
                        owner: key.owner.clone(),
                        label: "ci-deploy".to_string(),
                    })
                );
            }
        }
        assert_eq!(store.by_digest.read().len(), 49);
    }
}
