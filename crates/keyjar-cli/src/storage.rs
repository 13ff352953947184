use std::path::PathBuf;

use crate::config::Config;
use color_eyre::Result;
use dirs::data_dir;
use keyjar_core::manager::KeyManager;
use keyjar_storage::{encrypted_store::EncryptedRecordStore, key_provider::FileKeyProvider};
use tracing::debug;

const KEY_FILE_NAME: &str = "keyjar.key";
const STORE_FILE_NAME: &str = "api_keys.json";

/// Where the key file and the record store live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub key_file: PathBuf,
    pub store_file: PathBuf,
}

/// Resolve the default data directory for keyjar.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("keyjar"))
}

/// Resolve file locations: explicit paths, then `data_dir`, then the platform default.
pub fn resolve_paths(config: &Config) -> Result<StorePaths> {
    let root = match &config.data_dir {
        Some(dir) => dir.clone(),
        None => default_data_dir()?,
    };
    Ok(StorePaths {
        key_file: config
            .key_file
            .clone()
            .unwrap_or_else(|| root.join(KEY_FILE_NAME)),
        store_file: config
            .store_file
            .clone()
            .unwrap_or_else(|| root.join(STORE_FILE_NAME)),
    })
}

/// Open the encrypted store described by `paths`. Fails if the key file
/// cannot be read or created; there is no fallback key.
pub async fn open_store(paths: &StorePaths) -> Result<EncryptedRecordStore> {
    let provider = FileKeyProvider::new(&paths.key_file);
    debug!(
        key_file = %provider.path().display(),
        store_file = %paths.store_file.display(),
        "initializing encrypted store"
    );
    EncryptedRecordStore::open(&paths.store_file, &provider)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("cannot open key store: {e}"))
}

/// Build the key manager from config overrides.
pub async fn manager_from_config(config: &Config) -> Result<KeyManager<EncryptedRecordStore>> {
    let paths = resolve_paths(config)?;
    Ok(KeyManager::new(open_store(&paths).await?))
}

/// Helper for tests to construct paths rooted at a temp dir.
#[cfg(test)]
pub fn test_paths(root: &std::path::Path) -> StorePaths {
    StorePaths {
        key_file: root.join(KEY_FILE_NAME),
        store_file: root.join(STORE_FILE_NAME),
    }
}
