//! Durable object storage: one blob plus one JSON sidecar per content key.
//!
//! ```text
//! data/
//! ├── 9f86d081884c7d65        # blob, raw bytes as uploaded
//! ├── 9f86d081884c7d65.json   # sidecar ObjectMeta (pretty JSON)
//! └── ...
//! ```
//!
//! Objects are create-once: there is no update path. Creating the blob with
//! `create_new` makes two racing `put`s for the same key resolve to exactly
//! one winner; the loser gets [`MediaError::Conflict`].
//!
//! The sidecar is written after the blob, so a concurrent reader can briefly
//! see a key as missing while it is being created. `rem` deletes in the
//! same order. If the blob goes but the sidecar can't be removed, the error
//! is surfaced and nothing is rolled back. A later `put` of the same key
//! overwrites the orphaned sidecar.

use crate::error::{MediaError, Result};
use crate::types::{NewObject, ObjectMeta};
use bytes::Bytes;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Extension of the sidecar metadata file.
const SIDECAR_EXTENSION: &str = "json";

/// Storage backend for blobs and their metadata.
///
/// `LocalStore` is the production implementation. Tests use an in-memory
/// recorder so they can count store reads.
pub trait ObjectStore: Send + Sync {
    /// Create blob and metadata. Fails with `Conflict` if `key` exists.
    fn put(&self, key: &str, object: NewObject, data: &[u8]) -> Result<ObjectMeta>;

    /// Read the blob for `key`.
    fn get(&self, key: &str) -> Result<Bytes>;

    /// Read the sidecar metadata for `key`.
    fn get_meta(&self, key: &str) -> Result<ObjectMeta>;

    /// Delete blob and metadata.
    fn rem(&self, key: &str) -> Result<()>;
}

/// SHA-256 hex digest of `data`, the conventional content key.
///
/// The store never calls this itself; keys are whatever the caller uploads
/// under. It backs the `key` CLI helper.
pub fn content_key(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// [`content_key`] of a file's contents.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(content_key(&bytes))
}

/// Reject keys that could escape the data directory or collide with the
/// `<key>.<ext>` resource syntax.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(MediaError::InvalidInput("empty content key".into()));
    }
    if let Some(bad) = key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(MediaError::InvalidInput(format!(
            "content key `{key}` contains invalid character `{bad}`"
        )));
    }
    Ok(())
}

/// Filesystem-backed store rooted at a data directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open a store, creating the data directory if it doesn't exist.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{SIDECAR_EXTENSION}"))
    }

    fn write_meta(&self, key: &str, meta: &ObjectMeta) -> Result<()> {
        let file = File::create(self.meta_path(key))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, meta)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

fn not_found(key: &str, err: io::Error) -> MediaError {
    if err.kind() == io::ErrorKind::NotFound {
        MediaError::NotFound(key.to_string())
    } else {
        MediaError::Io(err)
    }
}

impl ObjectStore for LocalStore {
    fn put(&self, key: &str, object: NewObject, data: &[u8]) -> Result<ObjectMeta> {
        validate_key(key)?;
        let blob_path = self.blob_path(key);

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&blob_path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(MediaError::Conflict(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let meta = object.into_meta(Utc::now());
        let written = file
            .write_all(data)
            .and_then(|_| file.flush())
            .map_err(MediaError::from)
            .and_then(|_| self.write_meta(key, &meta));

        if let Err(err) = written {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&blob_path) {
                tracing::error!(key, error = %cleanup, "failed to remove partial blob");
            }
            return Err(err);
        }

        tracing::info!(key, mime = %meta.mime, size = data.len(), "stored object");
        Ok(meta)
    }

    fn get(&self, key: &str) -> Result<Bytes> {
        validate_key(key)?;
        fs::read(self.blob_path(key))
            .map(Bytes::from)
            .map_err(|e| not_found(key, e))
    }

    fn get_meta(&self, key: &str) -> Result<ObjectMeta> {
        validate_key(key)?;
        let raw = fs::read(self.meta_path(key)).map_err(|e| not_found(key, e))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    fn rem(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        let blob = fs::remove_file(self.blob_path(key));
        // Attempted regardless of the blob outcome so stray sidecars get cleaned up.
        let meta = fs::remove_file(self.meta_path(key));

        match (blob, meta) {
            (Err(e), _) => Err(not_found(key, e)),
            (Ok(()), Ok(())) => {
                tracing::info!(key, "removed object");
                Ok(())
            }
            (Ok(()), Err(e)) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(key, "removed blob that had no sidecar");
                Ok(())
            }
            (Ok(()), Err(e)) => {
                tracing::error!(key, error = %e, "blob removed but sidecar left behind");
                Err(MediaError::Internal(format!(
                    "blob `{key}` removed but its metadata could not be deleted: {e}"
                )))
            }
        }
    }
}
