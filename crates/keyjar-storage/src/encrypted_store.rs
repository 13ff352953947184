use std::path::{Path, PathBuf};

use async_trait::async_trait;
use keyjar_core::{
    records::Record,
    storage::{RecordStore, StoreError},
};
use tracing::{debug, instrument};

use crate::{
    cipher::{CipherError, TokenCipher},
    document::{Document, KEYS_TABLE},
    key_provider::KeyProvider,
};

/// AES-GCM encrypted record store backed by a JSON document file,
/// implementing the shared `RecordStore` contract.
///
/// Key material is obtained once in [`EncryptedRecordStore::open`]; a key
/// provider failure there is fatal and no store is constructed.
pub struct EncryptedRecordStore {
    path: PathBuf,
    cipher: TokenCipher,
}

impl EncryptedRecordStore {
    pub async fn open<P: KeyProvider + ?Sized>(
        path: impl Into<PathBuf>,
        key_provider: &P,
    ) -> Result<Self, StoreError> {
        let material = key_provider
            .get_or_create()
            .await
            .map_err(|e| StoreError::KeyMaterial {
                reason: e.to_string(),
            })?;
        let cipher = TokenCipher::new(&material).map_err(|e| StoreError::KeyMaterial {
            reason: e.to_string(),
        })?;
        let path = path.into();
        debug!(path = %path.display(), key_id = %material.id, "opened record store");
        Ok(Self { path, cipher })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<(Document, Vec<Record>), StoreError> {
        let doc = Document::load(&self.path)?;
        let records = doc.records(KEYS_TABLE)?;
        Ok((doc, records))
    }

    fn write(&self, mut doc: Document, records: &[Record]) -> Result<(), StoreError> {
        doc.set_records(KEYS_TABLE, records)?;
        doc.save(&self.path)
    }
}

#[async_trait]
impl RecordStore for EncryptedRecordStore {
    #[instrument(skip_all, fields(service = %service))]
    async fn save(&self, service: &str, plaintext_key: &str) -> Result<(), StoreError> {
        let token = self
            .cipher
            .seal(plaintext_key.as_bytes())
            .map_err(|e| StoreError::Storage {
                reason: e.to_string(),
            })?;

        let (doc, mut records) = self.load()?;
        records.push(Record::new(service, token));
        self.write(doc, &records)
    }

    #[instrument(skip_all)]
    async fn get_decrypted(&self, ciphertext: &str) -> Result<String, StoreError> {
        let bytes = self.cipher.open(ciphertext).map_err(decryption_err)?;
        String::from_utf8(bytes).map_err(|e| StoreError::Decryption {
            reason: format!("plaintext is not UTF-8: {e}"),
        })
    }

    #[instrument(skip_all, fields(service = %service))]
    async fn delete(&self, service: &str) -> Result<(), StoreError> {
        let (doc, mut records) = self.load()?;
        let before = records.len();
        records.retain(|r| r.service != service);
        if records.len() == before {
            return Ok(());
        }
        debug!(removed = before - records.len(), "deleted records");
        self.write(doc, &records)
    }

    #[instrument(skip_all)]
    async fn list_all(&self) -> Result<Vec<Record>, StoreError> {
        self.load().map(|(_, records)| records)
    }
}

fn decryption_err(err: CipherError) -> StoreError {
    StoreError::Decryption {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    use keyjar_core::{
        manager::{KeyManager, ManagerError},
        storage::RecordStore,
    };

    use super::*;
    use crate::key_provider::{FileKeyProvider, InMemoryKeyProvider};

    async fn test_store(dir: &Path) -> EncryptedRecordStore {
        EncryptedRecordStore::open(dir.join("api_keys.json"), &InMemoryKeyProvider::default())
            .await
            .expect("open")
    }

    #[tokio::test]
    async fn end_to_end_save_list_decrypt_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = test_store(dir.path()).await;
        assert!(store.list_all().await.expect("list").is_empty());

        store.save("OpenAI", "sk-test-123").await.expect("save");
        let records = store.list_all().await.expect("list");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].service, "OpenAI");
        assert_eq!(
            store.get_decrypted(&records[0].key).await.expect("decrypt"),
            "sk-test-123"
        );

        store.delete("OpenAI").await.expect("delete");
        assert!(store.list_all().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn plaintext_is_not_written_to_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = test_store(dir.path()).await;
        store.save("OpenAI", "sk-test-123").await.expect("save");

        let stored = std::fs::read_to_string(store.path()).expect("read document");
        assert!(stored.contains("OpenAI"));
        assert!(
            !stored.contains("sk-test-123"),
            "plaintext must not be stored"
        );
    }

    #[tokio::test]
    async fn same_key_saved_twice_gets_distinct_ciphertexts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = test_store(dir.path()).await;
        store.save("a", "same").await.expect("save");
        store.save("b", "same").await.expect("save");

        let records = store.list_all().await.expect("list");
        assert_ne!(records[0].key, records[1].key);
    }

    #[tokio::test]
    async fn tampered_ciphertext_is_a_decryption_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = test_store(dir.path()).await;
        store.save("GitHub", "ghp_secret").await.expect("save");
        let token = store.list_all().await.expect("list")[0].key.clone();

        let mut raw = URL_SAFE_NO_PAD.decode(&token).expect("decode");
        let last = raw.len() - 1;
        raw[last] ^= 0x80;
        let err = store
            .get_decrypted(&URL_SAFE_NO_PAD.encode(raw))
            .await
            .expect_err("tampered");
        assert!(matches!(err, StoreError::Decryption { .. }));

        let err = store.get_decrypted("garbage").await.expect_err("garbage");
        assert!(matches!(err, StoreError::Decryption { .. }));
    }

    #[tokio::test]
    async fn delete_missing_service_leaves_file_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = test_store(dir.path()).await;
        store.save("OpenAI", "k").await.expect("save");
        let before = std::fs::read(store.path()).expect("read");

        store.delete("Nope").await.expect("no-op delete");
        assert_eq!(std::fs::read(store.path()).expect("read"), before);

        // Deleting from a store that was never written is fine too.
        let empty_dir = tempfile::tempdir().expect("tempdir");
        let empty = test_store(empty_dir.path()).await;
        empty.delete("Nope").await.expect("no-op delete");
        assert!(!empty.path().exists());
    }

    #[tokio::test]
    async fn delete_removes_every_matching_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = test_store(dir.path()).await;
        store.save("dup", "1").await.expect("save");
        store.save("keep", "2").await.expect("save");
        store.save("dup", "3").await.expect("save");

        store.delete("dup").await.expect("delete");
        let services: Vec<String> = store
            .list_all()
            .await
            .expect("list")
            .into_iter()
            .map(|r| r.service)
            .collect();
        assert_eq!(services, vec!["keep"]);
    }

    #[tokio::test]
    async fn records_survive_reopen_with_same_key_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let keys = FileKeyProvider::new(dir.path().join("keyjar.key"));
        let doc = dir.path().join("api_keys.json");

        let store = EncryptedRecordStore::open(&doc, &keys).await.expect("open");
        store.save("Stripe", "sk_live_x").await.expect("save");
        drop(store);

        let reopened = EncryptedRecordStore::open(&doc, &keys)
            .await
            .expect("reopen");
        let record = reopened.list_all().await.expect("list").remove(0);
        assert_eq!(
            reopened.get_decrypted(&record.key).await.expect("decrypt"),
            "sk_live_x"
        );
    }

    #[tokio::test]
    async fn records_from_another_key_fail_to_decrypt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let doc = dir.path().join("api_keys.json");
        let first = EncryptedRecordStore::open(&doc, &InMemoryKeyProvider::default())
            .await
            .expect("open");
        first.save("OpenAI", "sk").await.expect("save");

        let second = EncryptedRecordStore::open(&doc, &InMemoryKeyProvider::default())
            .await
            .expect("open");
        let record = second.list_all().await.expect("list").remove(0);
        let err = second
            .get_decrypted(&record.key)
            .await
            .expect_err("wrong key");
        assert!(matches!(err, StoreError::Decryption { .. }));
    }

    #[tokio::test]
    async fn unusable_key_file_prevents_opening() {
        let dir = tempfile::tempdir().expect("tempdir");
        let key_path = dir.path().join("keyjar.key");
        std::fs::write(&key_path, "short").expect("write");

        let provider = FileKeyProvider::new(&key_path);
        let result = EncryptedRecordStore::open(dir.path().join("api_keys.json"), &provider).await;
        assert!(matches!(result, Err(StoreError::KeyMaterial { .. })));
    }

    #[tokio::test]
    async fn manager_rejects_duplicate_without_touching_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let keys = KeyManager::new(test_store(dir.path()).await);
        keys.add("GitHub", "ghp_one").await.expect("add");

        let err = keys.add("GitHub", "ghp_two").await.expect_err("duplicate");
        assert!(matches!(err, ManagerError::DuplicateService { .. }));
        assert_eq!(keys.store().list_all().await.expect("list").len(), 1);
        assert_eq!(keys.reveal("GitHub").await.expect("reveal"), "ghp_one");
    }
}
