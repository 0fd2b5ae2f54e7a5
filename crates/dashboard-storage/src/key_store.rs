//! Obfuscated credential persistence.
//!
//! Credentials (third-party AI provider keys and the like) are stored under
//! `credential.<name>` as `v1:` + base64(value XOR mask), where the mask is
//! derived from SHA-256 over a fixed context and the credential name. This
//! keeps values out of plain sight at rest; it is not encryption.
//!
//! No method returns an error. Unreadable entries behave exactly like absent
//! ones and failures are logged.

use crate::{SecureStorage, StorageKeys};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

const ENCODING_PREFIX: &str = "v1:";
const MASK_CONTEXT: &[u8] = b"studydash-credential-mask-v1";

/// Named credential store on top of a [`SecureStorage`] backend.
#[derive(Clone)]
pub struct KeyStore {
    storage: Arc<dyn SecureStorage>,
}

impl KeyStore {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Obfuscate and persist `value` under `name`.
    ///
    /// Returns false for an empty name or value, or when the backend write fails.
    pub fn set(&self, name: &str, value: &str) -> bool {
        if name.trim().is_empty() || value.is_empty() {
            warn!(credential = %name, "Refusing to store empty credential");
            return false;
        }

        let encoded = encode(name, value);
        match self.storage.set(&StorageKeys::credential(name), &encoded) {
            Ok(()) => {
                debug!(credential = %name, "Stored credential");
                true
            }
            Err(e) => {
                warn!(credential = %name, error = %e, "Failed to store credential");
                false
            }
        }
    }

    /// Decode the stored value, or `None` when absent or unreadable.
    pub fn get(&self, name: &str) -> Option<String> {
        let raw = match self.storage.get(&StorageKeys::credential(name)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(credential = %name, error = %e, "Failed to read credential");
                return None;
            }
        };

        let decoded = decode(name, &raw);
        if decoded.is_none() {
            warn!(credential = %name, "Stored credential could not be decoded");
        }
        decoded
    }

    /// Presence check without decoding.
    pub fn has(&self, name: &str) -> bool {
        self.storage
            .has(&StorageKeys::credential(name))
            .unwrap_or_else(|e| {
                warn!(credential = %name, error = %e, "Failed to check credential");
                false
            })
    }

    /// Delete the entry. Returns true if something was removed.
    pub fn remove(&self, name: &str) -> bool {
        self.storage
            .delete(&StorageKeys::credential(name))
            .unwrap_or_else(|e| {
                warn!(credential = %name, error = %e, "Failed to remove credential");
                false
            })
    }

    /// The stored value, else `fallback`, else `None`.
    pub fn best_available(&self, name: &str, fallback: Option<&str>) -> Option<String> {
        self.get(name)
            .or_else(|| fallback.map(|f| f.to_string()))
    }

    /// Store `value` only if no usable credential exists under `name`.
    ///
    /// Returns true when the default was written.
    pub fn seed_default(&self, name: &str, value: &str) -> bool {
        if self.get(name).is_some() {
            return false;
        }
        let seeded = self.set(name, value);
        if seeded {
            debug!(credential = %name, "Seeded default credential");
        }
        seeded
    }

    /// Names of every stored credential.
    pub fn names(&self) -> Vec<String> {
        match self
            .storage
            .list_keys_with_prefix(StorageKeys::CREDENTIAL_PREFIX)
        {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|k| {
                    k.strip_prefix(StorageKeys::CREDENTIAL_PREFIX)
                        .map(|n| n.to_string())
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list credentials");
                Vec::new()
            }
        }
    }
}

fn mask(name: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(MASK_CONTEXT);
    hasher.update(name.as_bytes());
    hasher.finalize().into()
}

fn xor_with_mask(name: &str, bytes: &[u8]) -> Vec<u8> {
    let mask = mask(name);
    bytes
        .iter()
        .zip(mask.iter().cycle())
        .map(|(b, m)| b ^ m)
        .collect()
}

fn encode(name: &str, value: &str) -> String {
    format!(
        "{}{}",
        ENCODING_PREFIX,
        BASE64.encode(xor_with_mask(name, value.as_bytes()))
    )
}

fn decode(name: &str, raw: &str) -> Option<String> {
    let body = raw.strip_prefix(ENCODING_PREFIX)?;
    let bytes = BASE64.decode(body).ok()?;
    String::from_utf8(xor_with_mask(name, &bytes)).ok()
}
