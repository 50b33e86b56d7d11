//! JSON credential store
//!
//! One flat JSON object per file, keyed `"{service_key}_{field}"`:
//!
//! ```json
//! {"svc-a_access_token": "A", "svc-a_refresh_token": "R", "svc-a_expires_in": 3600}
//! ```
//!
//! Every mutation is a full read-modify-write of the document under a tokio
//! Mutex, so concurrent tool calls in one process never interleave their
//! writes. There is no cross-process locking; one active writer per file is
//! assumed. Writes go through a temp file + rename and leave the file 0600.

use std::path::{Path, PathBuf};

use common::Secret;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::constants::{ACCESS_TOKEN_FIELD, REFRESH_TOKEN_FIELD, STATUS_FIELD};
use crate::error::{Error, Result};

/// The whole persisted document.
pub type Document = Map<String, Value>;

/// One service's view of the document.
///
/// `access_token == None` means a token was never acquired for the key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialRecord {
    pub access_token: Option<Secret<String>>,
    pub refresh_token: Option<Secret<String>>,
    /// Remaining fields (expiry, scope, ...) with the key prefix removed.
    pub extra: Map<String, Value>,
}

impl CredentialRecord {
    /// Collect the fields of `key` from a flat document.
    ///
    /// Returns `None` when the document holds no field for the key. Keys that
    /// are prefixes of one another (`svc`, `svc_b`) are not disambiguated.
    pub fn from_document(doc: &Document, key: &str) -> Option<Self> {
        let prefix = field_name(key, "");
        let mut record = CredentialRecord::default();
        let mut found = false;

        for (name, value) in doc {
            let Some(field) = name.strip_prefix(&prefix) else {
                continue;
            };
            found = true;
            match (field, value) {
                (ACCESS_TOKEN_FIELD, Value::String(token)) => {
                    record.access_token = Some(Secret::new(token.clone()));
                }
                (REFRESH_TOKEN_FIELD, Value::String(token)) => {
                    record.refresh_token = Some(Secret::new(token.clone()));
                }
                _ => {
                    record.extra.insert(field.to_owned(), value.clone());
                }
            }
        }

        found.then_some(record)
    }
}

/// Flat document field name for `field` of service `key`.
pub fn field_name(key: &str, field: &str) -> String {
    format!("{key}_{field}")
}

/// Handle to a credential file.
///
/// Cheap to construct; share one handle (via `Arc`) per file so the write
/// lock actually serializes writers.
pub struct CredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    /// Create a handle for `path`. Nothing is read or created until used.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the store file.
    ///
    /// An absent file is `StoreMissing`; callers decide whether that is an
    /// error. A present file that is not a JSON object is `StoreUnreadable`.
    pub async fn load(&self) -> Result<Document> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::StoreMissing(self.path.clone()));
            }
            Err(e) => {
                return Err(Error::StoreUnreadable(format!(
                    "reading {}: {e}",
                    self.path.display()
                )));
            }
        };

        let doc: Document = serde_json::from_str(&contents).map_err(|e| {
            Error::StoreUnreadable(format!("parsing {}: {e}", self.path.display()))
        })?;
        debug!(path = %self.path.display(), fields = doc.len(), "loaded credential store");
        Ok(doc)
    }

    /// `load()`, with a missing file read as an empty document.
    pub async fn load_or_empty(&self) -> Result<Document> {
        match self.load().await {
            Err(Error::StoreMissing(_)) => Ok(Document::new()),
            other => other,
        }
    }

    /// Replace the whole document on disk.
    pub async fn save(&self, doc: &Document) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(doc).await
    }

    /// Load the document, creating the file as `{}` if it does not exist.
    ///
    /// This is the "read credentials" path: afterwards the store is
    /// guaranteed to exist on disk.
    pub async fn load_or_create(&self) -> Result<Document> {
        let _guard = self.write_lock.lock().await;
        match self.load().await {
            Err(Error::StoreMissing(_)) => {
                info!(
                    path = %self.path.display(),
                    "credential store not found, creating empty store"
                );
                let doc = Document::new();
                self.write(&doc).await?;
                Ok(doc)
            }
            other => other,
        }
    }

    /// Merge `fields` into the record for `key` and persist.
    ///
    /// Each field is written as `{key}_{field}`, overwriting earlier values.
    /// `status` is never persisted. Fields already stored for the key but
    /// absent from `fields` are kept.
    pub async fn merge(&self, key: &str, fields: &Map<String, Value>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load_or_empty().await?;

        for (field, value) in fields {
            if field == STATUS_FIELD {
                continue;
            }
            doc.insert(field_name(key, field), value.clone());
        }

        self.write(&doc).await?;
        debug!(key, fields = fields.len(), "merged credential fields");
        Ok(())
    }

    /// The record for `key`, or `None` if nothing is stored for it.
    ///
    /// Propagates `StoreMissing` so callers can branch on it.
    pub async fn record(&self, key: &str) -> Result<Option<CredentialRecord>> {
        let doc = self.load().await?;
        Ok(CredentialRecord::from_document(&doc, key))
    }

    /// Service keys that hold an access token, sorted.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let doc = self.load_or_empty().await?;
        let suffix = format!("_{ACCESS_TOKEN_FIELD}");
        let mut keys: Vec<String> = doc
            .keys()
            .filter_map(|name| name.strip_suffix(&suffix))
            .map(str::to_owned)
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Write without taking the lock. Callers hold `write_lock`.
    async fn write(&self, doc: &Document) -> Result<()> {
        let json = serde_json::to_string_pretty(doc)
            .map_err(|e| Error::StoreWriteFailed(format!("serializing credentials: {e}")))?;
        write_atomic(&self.path, json.as_bytes()).await
    }
}

/// Write a credential file atomically.
///
/// Creates the parent directory if needed, writes a temporary sibling file
/// that is 0600 on unix from creation, then renames it over the target.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        Error::StoreWriteFailed(format!("creating directory {}: {e}", dir.display()))
    })?;

    let file_name = path
        .file_name()
        .ok_or_else(|| Error::StoreWriteFailed(format!("{} has no file name", path.display())))?;
    let tmp_path = dir.join(format!(
        ".{}.tmp.{}",
        file_name.to_string_lossy(),
        uuid::Uuid::new_v4().as_simple()
    ));

    if let Err(e) = write_private(&tmp_path, contents).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::StoreWriteFailed(format!("writing temp file: {e}")));
    }

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::StoreWriteFailed(format!(
            "renaming temp file onto {}: {e}",
            path.display()
        )));
    }

    debug!(path = %path.display(), "persisted credential file");
    Ok(())
}

/// Create `path` (which must not exist) readable by the owner only, and
/// write `contents` to it.
async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await
}
