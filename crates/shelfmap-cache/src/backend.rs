//! Raw string-keyed storage behind [`crate::LocalCache`].

use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::error::CacheError;

const ENTRY_EXT: &str = "entry";

/// Longest hex-encoded key used directly as a file stem. Longer keys are
/// stored under a digest name with the key on the file's first line.
const MAX_HEX_STEM: usize = 200;

/// Stem prefix for digest-named entries. Never valid hex, so the two
/// naming schemes cannot collide.
const DIGEST_PREFIX: &str = "sha256-";

/// Process-wide key/value store. Implementations do not interpret values.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: String) -> Result<(), CacheError>;
    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), CacheError>;
    async fn list_keys(&self) -> Result<Vec<String>, CacheError>;
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}

/// One file per key inside `dir`. The file name is the hex-encoded key so
/// `list_keys` can recover keys without an index. Keys too long for a file
/// name are stored under their SHA-256 with the key as the first line.
///
/// Writes go to a uniquely named temp file that is renamed over the entry,
/// so concurrent writers of one key are last-writer-wins and readers never
/// see a partial entry.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Open (creating if needed) a cache directory.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{ENTRY_EXT}", entry_stem(key)))
    }
}

fn entry_stem(key: &str) -> String {
    let hex = encode_key(key);
    if hex.len() <= MAX_HEX_STEM {
        hex
    } else {
        format!("{DIGEST_PREFIX}{}", encode_bytes(&Sha256::digest(key.as_bytes())))
    }
}

fn is_digest_stem(stem: &str) -> bool {
    stem.starts_with(DIGEST_PREFIX)
}

/// Split a digest-named file into its key line and value.
fn split_keyed(content: &str) -> Option<(&str, &str)> {
    content.split_once('\n')
}

#[async_trait]
impl CacheBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let hashed = is_digest_stem(&entry_stem(key));
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(content) if hashed => Ok(match split_keyed(&content) {
                Some((stored, value)) if stored == key => Some(value.to_string()),
                // Unreadable layout is corruption; a different key is a digest collision.
                Some(_) => None,
                None => Some(String::new()),
            }),
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            // Non-UTF-8 content is corruption, surfaced to LocalCache as an unparseable value.
            Err(e) if e.kind() == ErrorKind::InvalidData => Ok(Some(String::new())),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        let dir = self.dir.clone();
        let path = self.path_for(key);
        let key_line = is_digest_stem(&entry_stem(key)).then(|| format!("{key}\n"));

        tokio::task::spawn_blocking(move || -> Result<(), CacheError> {
            let mut tmp = tempfile::Builder::new()
                .prefix(".write-")
                .suffix(".tmp")
                .tempfile_in(&dir)?;
            if let Some(line) = key_line {
                tmp.write_all(line.as_bytes())?;
            }
            tmp.write_all(value.as_bytes())?;
            tmp.persist(&path).map_err(|e| CacheError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::Backend(format!("cache write task failed: {e}")))?
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self) -> Result<Vec<String>, CacheError> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if is_digest_stem(stem) {
                match tokio::fs::read_to_string(&path).await {
                    Ok(content) => match split_keyed(&content) {
                        Some((key, _)) => keys.push(key.to_string()),
                        None => {
                            tracing::warn!(
                                file = %path.display(),
                                "skipping unrecognised cache file"
                            );
                        }
                    },
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!(
                            file = %path.display(),
                            error = %e,
                            "skipping unreadable cache file"
                        );
                    }
                }
                continue;
            }
            match decode_key(stem) {
                Some(key) => keys.push(key),
                None => tracing::warn!(file = %path.display(), "skipping unrecognised cache file"),
            }
        }
        Ok(keys)
    }
}

fn encode_key(key: &str) -> String {
    encode_bytes(key.as_bytes())
}

fn encode_bytes(bytes: &[u8]) -> String {
    use std::fmt::Write as _;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

fn decode_key(encoded: &str) -> Option<String> {
    if encoded.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..encoded.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(encoded.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}
