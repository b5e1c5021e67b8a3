//! Credential Vault (spec §4.A) — encrypted-at-rest storage of reusable
//! SSH credentials, keyed by id.
//!
//! Persistence follows the single-file-on-disk model of `project.rs`'s
//! token store, but durable: records are authenticated-encrypted with
//! AES-256-GCM (grounded in the `aes_gcm` usage in the TrustEdge network
//! server) and the file is written atomically (write-to-temp then
//! rename) so a concurrent `save`/`delete` can't interleave a partial
//! write. A record that fails to decrypt is treated as absent — the
//! vault fails closed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::{Context, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Full credential record, including secrets. Never serialized back to a
/// client wholesale — `list()`/`connections()` return a stripped
/// projection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth_type: AuthType,
    pub password: Option<String>,
    pub private_key: Option<String>,
    pub passphrase: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Password,
    Key,
}

/// Non-sensitive projection returned by `list()`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSummary {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth_type: AuthType,
}

/// Connection metadata returned by `connections()`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub has_stored_credentials: bool,
}

impl From<&CredentialRecord> for CredentialSummary {
    fn from(r: &CredentialRecord) -> Self {
        Self {
            id: r.id.clone(),
            host: r.host.clone(),
            port: r.port,
            username: r.username.clone(),
            auth_type: r.auth_type,
        }
    }
}

/// On-disk envelope: one entry per record, nonce ‖ ciphertext ‖ tag,
/// base64-encoded as a single string (per spec §9 design note).
#[derive(Serialize, Deserialize, Default)]
struct VaultFile {
    entries: HashMap<String, String>,
}

pub struct Vault {
    path: PathBuf,
    cipher: Aes256Gcm,
    state: Mutex<HashMap<String, String>>,
}

impl Vault {
    /// Derive the at-rest key from the configured secret and open (or
    /// lazily create) the backing file. A file that exists but can't be
    /// parsed is treated as empty rather than failing startup — the vault
    /// must still be writable.
    pub fn open(path: PathBuf, key_material: &str) -> Result<Self> {
        let key_bytes = derive_key(key_material);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));

        let state = if path.exists() {
            load_entries(&path).unwrap_or_default()
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            cipher,
            state: Mutex::new(state),
        })
    }

    pub fn save(&self, id: &str, record: &CredentialRecord) -> Result<()> {
        let plaintext = serde_json::to_vec(record).context("serialize credential record")?;
        let envelope = self.encrypt(&plaintext);

        let mut state = self.state.lock().unwrap();
        state.insert(id.to_string(), envelope);
        persist_atomically(&self.path, &state)
    }

    /// Fails closed: any decryption or parse error is treated as "not
    /// found" rather than propagated, per spec §4.A.
    pub fn get(&self, id: &str) -> Option<CredentialRecord> {
        let state = self.state.lock().unwrap();
        let envelope = state.get(id)?;
        let plaintext = self.decrypt(envelope).ok()?;
        serde_json::from_slice(&plaintext).ok()
    }

    pub fn has(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let removed = state.remove(id).is_some();
        if removed {
            persist_atomically(&self.path, &state)?;
        }
        Ok(removed)
    }

    pub fn list(&self) -> Vec<CredentialSummary> {
        let state = self.state.lock().unwrap();
        state
            .keys()
            .filter_map(|id| self.get(id))
            .map(|r| CredentialSummary::from(&r))
            .collect()
    }

    pub fn connections(&self) -> Vec<ConnectionSummary> {
        let state = self.state.lock().unwrap();
        state
            .keys()
            .filter_map(|id| self.get(id))
            .map(|r| ConnectionSummary {
                id: r.id.clone(),
                host: r.host.clone(),
                port: r.port,
                username: r.username.clone(),
                has_stored_credentials: true,
            })
            .collect()
    }

    fn encrypt(&self, plaintext: &[u8]) -> String {
        let mut nonce_bytes = [0u8; 12];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .expect("AES-GCM encryption is infallible for in-memory buffers");

        let mut combined = Vec::with_capacity(nonce_bytes.len() + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, combined)
    }

    fn decrypt(&self, envelope: &str) -> Result<Vec<u8>> {
        let combined = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, envelope)
            .context("invalid base64 envelope")?;
        if combined.len() < 12 {
            anyhow::bail!("envelope too short");
        }
        let (nonce_bytes, ciphertext) = combined.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| anyhow::anyhow!("decryption failed"))
    }
}

fn derive_key(material: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    hasher.finalize().into()
}

fn load_entries(path: &Path) -> Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path).context("read credentials file")?;
    let file: VaultFile = serde_json::from_str(&content).context("parse credentials file")?;
    Ok(file.entries)
}

fn persist_atomically(path: &Path, entries: &HashMap<String, String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("create credentials directory")?;
    }
    let file = VaultFile {
        entries: entries.clone(),
    };
    let serialized = serde_json::to_vec_pretty(&file).context("serialize credentials file")?;

    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, serialized).context("write temporary credentials file")?;
    std::fs::rename(&tmp_path, path).context("rename temporary credentials file into place")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> CredentialRecord {
        CredentialRecord {
            id: id.to_string(),
            host: "example.com".to_string(),
            port: 22,
            username: "alice".to_string(),
            auth_type: AuthType::Password,
            password: Some("hunter2".to_string()),
            private_key: None,
            passphrase: None,
        }
    }

    #[test]
    fn save_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::open(dir.path().join("creds.enc"), "secret-key-material").unwrap();

        let record = sample("c1");
        vault.save("c1", &record).unwrap();

        assert_eq!(vault.get("c1"), Some(record));
    }

    #[test]
    fn get_on_missing_id_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::open(dir.path().join("creds.enc"), "secret-key-material").unwrap();
        assert_eq!(vault.get("nope"), None);
    }

    #[test]
    fn wrong_key_fails_closed_instead_of_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.enc");
        let vault = Vault::open(path.clone(), "right-key").unwrap();
        vault.save("c1", &sample("c1")).unwrap();

        let reopened = Vault::open(path, "wrong-key").unwrap();
        assert_eq!(reopened.get("c1"), None);
    }

    #[test]
    fn delete_is_idempotent_on_second_call() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::open(dir.path().join("creds.enc"), "secret-key-material").unwrap();
        vault.save("c1", &sample("c1")).unwrap();

        assert!(vault.delete("c1").unwrap());
        assert!(!vault.delete("c1").unwrap());
    }

    #[test]
    fn list_never_contains_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::open(dir.path().join("creds.enc"), "secret-key-material").unwrap();
        vault.save("c1", &sample("c1")).unwrap();

        let listed = vault.list();
        assert_eq!(listed.len(), 1);
        let serialized = serde_json::to_string(&listed).unwrap();
        assert!(!serialized.contains("hunter2"));
    }

    #[test]
    fn corrupt_file_is_treated_as_empty_but_remains_writable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.enc");
        std::fs::write(&path, b"not json at all").unwrap();

        let vault = Vault::open(path, "secret-key-material").unwrap();
        assert!(vault.list().is_empty());

        vault.save("c1", &sample("c1")).unwrap();
        assert!(vault.has("c1"));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.enc");
        {
            let vault = Vault::open(path.clone(), "secret-key-material").unwrap();
            vault.save("c1", &sample("c1")).unwrap();
        }
        let reopened = Vault::open(path, "secret-key-material").unwrap();
        assert_eq!(reopened.get("c1"), Some(sample("c1")));
    }
}
