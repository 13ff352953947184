use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::{
    records::{filter_by_service, Record},
    storage::{RecordStore, StoreError},
};

/// Errors surfaced to the user by the key manager.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManagerError {
    /// A required field was empty.
    #[error("{field} must not be empty")]
    Validation { field: &'static str },
    /// A record with this exact service name already exists.
    #[error("service name already exists: {service}")]
    DuplicateService { service: String },
    /// No record with this service name.
    #[error("no key stored for service: {service}")]
    NotFound { service: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A record paired with the outcome of decrypting its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealedRecord {
    pub record: Record,
    pub plaintext: Result<String, StoreError>,
}

/// Summary of a full decrypt pass over the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub total: usize,
    /// Services whose ciphertext failed to decrypt with the current key.
    pub undecryptable: Vec<String>,
}

impl AuditReport {
    pub fn is_healthy(&self) -> bool {
        self.undecryptable.is_empty()
    }
}

/// Caller-level operations over a `RecordStore`: input validation, the
/// duplicate-service check, search and per-record decryption.
pub struct KeyManager<S: RecordStore> {
    store: Arc<S>,
}

impl<S: RecordStore> Clone for KeyManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RecordStore> KeyManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate and store a new key. Rejects blank fields and duplicate
    /// service names before anything is encrypted or written.
    #[instrument(skip(self, api_key))]
    pub async fn add(&self, service: &str, api_key: &str) -> Result<(), ManagerError> {
        if service.trim().is_empty() {
            return Err(ManagerError::Validation {
                field: "service name",
            });
        }
        if api_key.trim().is_empty() {
            return Err(ManagerError::Validation { field: "API key" });
        }

        let existing = self.store.list_all().await?;
        if existing.iter().any(|r| r.service == service) {
            warn!("refusing duplicate service");
            return Err(ManagerError::DuplicateService {
                service: service.to_string(),
            });
        }

        self.store.save(service, api_key).await?;
        debug!("key stored");
        Ok(())
    }

    /// All records, or only those whose service contains `query` (case-insensitive).
    #[instrument(skip(self))]
    pub async fn list(&self, query: Option<&str>) -> Result<Vec<Record>, ManagerError> {
        let records = self.store.list_all().await?;
        Ok(match query {
            Some(q) => filter_by_service(&records, q).into_iter().cloned().collect(),
            None => records,
        })
    }

    /// Decrypt the key stored for `service`.
    #[instrument(skip(self))]
    pub async fn reveal(&self, service: &str) -> Result<String, ManagerError> {
        let records = self.store.list_all().await?;
        let record = records
            .into_iter()
            .find(|r| r.service == service)
            .ok_or_else(|| ManagerError::NotFound {
                service: service.to_string(),
            })?;
        Ok(self.store.get_decrypted(&record.key).await?)
    }

    /// Decrypt every (filtered) record, keeping failures per record.
    #[instrument(skip(self))]
    pub async fn reveal_all(
        &self,
        query: Option<&str>,
    ) -> Result<Vec<RevealedRecord>, ManagerError> {
        let records = self.list(query).await?;
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let plaintext = self.store.get_decrypted(&record.key).await;
            if let Err(err) = &plaintext {
                warn!(service = %record.service, "stored key failed to decrypt: {err}");
            }
            out.push(RevealedRecord { record, plaintext });
        }
        Ok(out)
    }

    /// Remove the key for `service`. Absent services are not an error.
    #[instrument(skip(self))]
    pub async fn delete(&self, service: &str) -> Result<(), ManagerError> {
        self.store.delete(service).await?;
        Ok(())
    }

    /// Try to decrypt every stored key and report the ones that fail.
    pub async fn audit(&self) -> Result<AuditReport, ManagerError> {
        let revealed = self.reveal_all(None).await?;
        let undecryptable = revealed
            .iter()
            .filter(|r| r.plaintext.is_err())
            .map(|r| r.record.service.clone())
            .collect();
        Ok(AuditReport {
            total: revealed.len(),
            undecryptable,
        })
    }
}
