use std::{
    fmt,
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use rand::{rngs::OsRng, RngCore};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

/// Length in bytes of an AES-256 key.
pub const KEY_LEN: usize = 32;

/// Key material used for encryption at rest.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Identifier for logging (never log key bytes).
    pub id: String,
    /// 256-bit symmetric key.
    pub bytes: [u8; KEY_LEN],
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("id", &self.id)
            .field("bytes", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key file {}: {reason}", path.display())]
    KeyFile { path: PathBuf, reason: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
}

/// Provides access to the encryption key (key file in production; memory in tests).
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError>;
}

/// Key file provider. The first call generates a key and writes it to `path`;
/// later calls (in this or any future process) read the same bytes back.
///
/// The file holds the key as one line of URL-safe base64. It is written via a
/// temp file in the same directory, which is owner-only on Unix, and is never
/// overwritten once present.
#[derive(Debug, Clone)]
pub struct FileKeyProvider {
    path: PathBuf,
}

impl FileKeyProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn create(&self) -> Result<KeyMaterial, KeyError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;

        let material = generate_key();
        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| self.io_err(e))?;
        writeln!(tmp, "{}", encode_key(&material)).map_err(|e| self.io_err(e))?;
        tmp.flush().map_err(|e| self.io_err(e))?;
        tmp.persist_noclobber(&self.path)
            .map_err(|e| self.io_err(e.error))?;

        info!(path = %self.path.display(), "generated new key file");
        Ok(material)
    }

    fn io_err(&self, err: std::io::Error) -> KeyError {
        KeyError::KeyFile {
            path: self.path.clone(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl KeyProvider for FileKeyProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        // File operations are synchronous; wrap in async for trait compatibility.
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                debug!(path = %self.path.display(), "loaded key file");
                decode_key(contents.trim_end())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => self.create(),
            Err(err) => Err(self.io_err(err)),
        }
    }
}

/// In-memory key provider for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<Option<KeyMaterial>>>,
}

#[async_trait]
impl KeyProvider for InMemoryKeyProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))?;

        if let Some(existing) = guard.clone() {
            return Ok(existing);
        }

        let material = generate_key();
        *guard = Some(material.clone());
        Ok(material)
    }
}

fn generate_key() -> KeyMaterial {
    let mut bytes = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    KeyMaterial {
        id: "default".to_string(),
        bytes,
    }
}

fn encode_key(material: &KeyMaterial) -> String {
    URL_SAFE.encode(material.bytes)
}

fn decode_key(secret: &str) -> Result<KeyMaterial, KeyError> {
    let bytes = URL_SAFE
        .decode(secret)
        .map_err(|e| KeyError::Decode(e.to_string()))?;

    if bytes.len() != KEY_LEN {
        return Err(KeyError::Decode(format!(
            "expected {KEY_LEN} bytes, got {}",
            bytes.len()
        )));
    }

    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(&bytes);
    Ok(KeyMaterial {
        id: "default".to_string(),
        bytes: out,
    })
}
