//! Single-document JSON persistence.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use vigil_error::{StorageError, StorageErrorKind, VigilResult};

#[derive(Serialize)]
struct Envelope<'a, T> {
    version: u32,
    data: &'a T,
}

/// One JSON document holding a value of type `T`.
///
/// Documents are written as a versioned envelope. On load, an envelope whose
/// version is newer than the store's is rejected; a bare document without an
/// envelope is read as version 0. Missing fields are filled by the serde
/// defaults declared on `T`.
#[derive(Debug, Clone)]
pub struct JsonStore<T> {
    path: PathBuf,
    version: u32,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create a store for the document at `path`, written at schema `version`.
    pub fn new(path: impl Into<PathBuf>, version: u32) -> Self {
        Self {
            path: path.into(),
            version,
            _phantom: PhantomData,
        }
    }

    /// Location of the document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schema version written by [`save`](Self::save).
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Read the document.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON for `T`,
    /// or was written by a newer schema.
    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> VigilResult<Option<T>> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No persisted document");
                return Ok(None);
            }
            Err(e) => {
                return Err(StorageError::new(StorageErrorKind::FileRead(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )))
                .into());
            }
        };

        let raw: serde_json::Value =
            serde_json::from_str(&json).map_err(|e| self.malformed(e.to_string()))?;
        let (found, data) = split_envelope(raw);

        if found > self.version {
            return Err(StorageError::new(StorageErrorKind::UnsupportedVersion {
                path: self.path.display().to_string(),
                found,
                supported: self.version,
            })
            .into());
        }

        let value = serde_json::from_value(data).map_err(|e| self.malformed(e.to_string()))?;
        tracing::info!(version = found, "Loaded persisted document");
        Ok(Some(value))
    }

    /// Read the document, falling back to `T::default()` on absence or error.
    ///
    /// Errors are logged; the caller continues with fresh state.
    pub fn load_or_default(&self) -> T
    where
        T: Default,
    {
        match self.load() {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to load persisted document, starting fresh"
                );
                T::default()
            }
        }
    }

    /// Replace the document with `value`.
    ///
    /// Creates parent directories as needed and writes through a temp file
    /// followed by a rename.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    #[tracing::instrument(skip(self, value), fields(path = %self.path.display()))]
    pub fn save(&self, value: &T) -> VigilResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::new(StorageErrorKind::DirectoryCreation(format!(
                    "{}: {}",
                    parent.display(),
                    e
                )))
            })?;
        }

        let json = serde_json::to_string_pretty(&Envelope {
            version: self.version,
            data: value,
        })
        .map_err(vigil_error::JsonError::from)?;

        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, json).map_err(|e| {
            StorageError::new(StorageErrorKind::FileWrite(format!(
                "{}: {}",
                temp_path.display(),
                e
            )))
        })?;

        std::fs::rename(&temp_path, &self.path).map_err(|e| {
            StorageError::new(StorageErrorKind::FileWrite(format!(
                "rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            )))
        })?;

        tracing::debug!("Saved document");
        Ok(())
    }

    /// Delete the document if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove(&self) -> VigilResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Removed persisted document");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::new(StorageErrorKind::FileWrite(format!(
                "remove {}: {}",
                self.path.display(),
                e
            )))
            .into()),
        }
    }

    #[track_caller]
    fn malformed(&self, reason: String) -> StorageError {
        StorageError::new(StorageErrorKind::Malformed {
            path: self.path.display().to_string(),
            reason,
        })
    }
}

/// Separate a versioned envelope into `(version, data)`.
///
/// Anything that is not exactly an object with a numeric `version` and a
/// `data` member is a legacy document at version 0.
fn split_envelope(raw: serde_json::Value) -> (u32, serde_json::Value) {
    match raw {
        serde_json::Value::Object(mut map)
            if map.len() == 2
                && map.contains_key("data")
                && map.get("version").is_some_and(|v| v.is_u64()) =>
        {
            let version = map
                .get("version")
                .and_then(serde_json::Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(u32::MAX);
            let data = map.remove("data").unwrap_or(serde_json::Value::Null);
            (version, data)
        }
        other => (0, other),
    }
}
