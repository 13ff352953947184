use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::records::Record;

/// Errors produced by record store implementations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A ciphertext could not be decrypted with the current key
    /// (wrong key, truncation, tampering).
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
    /// The encryption key could not be obtained or is unusable.
    #[error("key material unavailable: {reason}")]
    KeyMaterial { reason: String },
}

/// Contract for the encrypted-at-rest record store behind every keyjar front end.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Encrypt `plaintext_key` and append `{service, ciphertext}`.
    /// Does not check for an existing record with the same service.
    async fn save(&self, service: &str, plaintext_key: &str) -> Result<(), StoreError>;

    /// Decrypt a ciphertext previously produced by `save`.
    async fn get_decrypted(&self, ciphertext: &str) -> Result<String, StoreError>;

    /// Remove every record whose service equals `service` exactly (idempotent).
    async fn delete(&self, service: &str) -> Result<(), StoreError>;

    /// Every stored record, in insertion order.
    async fn list_all(&self) -> Result<Vec<Record>, StoreError>;
}

/// In-memory record store that simulates encryption for tests and smoke runs.
/// This is not cryptographically secure; the production store in
/// `keyjar-storage` uses AES-GCM with a key loaded from the key file.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRecordStore {
    inner: Arc<Mutex<Vec<Record>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record verbatim, bypassing the masking step.
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, record: Record) {
        self.inner.lock().expect("lock").push(record);
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn save(&self, service: &str, plaintext_key: &str) -> Result<(), StoreError> {
        let mut records = self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;

        // XOR + hex is a placeholder to avoid storing plaintext in tests.
        records.push(Record::new(service, mask(plaintext_key.as_bytes())));
        Ok(())
    }

    async fn get_decrypted(&self, ciphertext: &str) -> Result<String, StoreError> {
        let bytes = unmask(ciphertext).ok_or_else(|| StoreError::Decryption {
            reason: "not a masked value".to_string(),
        })?;
        String::from_utf8(bytes).map_err(|err| StoreError::Decryption {
            reason: err.to_string(),
        })
    }

    async fn delete(&self, service: &str) -> Result<(), StoreError> {
        let mut records = self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        records.retain(|r| r.service != service);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Record>, StoreError> {
        let records = self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        Ok(records.clone())
    }
}

const MASK_BYTE: u8 = 0xA5;

fn mask(input: &[u8]) -> String {
    input.iter().map(|b| format!("{:02x}", b ^ MASK_BYTE)).collect()
}

fn unmask(input: &str) -> Option<Vec<u8>> {
    if input.len() % 2 != 0 || !input.is_ascii() {
        return None;
    }
    (0..input.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&input[i..i + 2], 16).ok().map(|b| b ^ MASK_BYTE))
        .collect()
}
