use serde::{Deserialize, Serialize};

/// A stored API key: the service label and the ciphertext token of the key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    /// User-chosen label, unique by convention (checked by `KeyManager`).
    pub service: String,
    /// Ciphertext token produced by the store's cipher. Never plaintext.
    pub key: String,
}

impl Record {
    pub fn new(service: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            key: key.into(),
        }
    }

    /// Case-insensitive substring match on the service name.
    /// An empty query matches every record.
    pub fn matches(&self, query: &str) -> bool {
        self.service
            .to_lowercase()
            .contains(&query.to_lowercase())
    }
}

/// Records whose service contains `query` case-insensitively, in stored order.
pub fn filter_by_service<'a>(records: &'a [Record], query: &str) -> Vec<&'a Record> {
    records.iter().filter(|r| r.matches(query)).collect()
}
