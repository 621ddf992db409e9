//! JSON file helpers shared by the contact book and message queue.
//!
//! Loads never fail: a missing file is an empty store, a corrupt one is
//! logged and treated as empty. Writes go to a temporary sibling first and
//! are renamed into place, so a crash mid-write leaves the previous contents.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Serialize, de::DeserializeOwned};

use crate::error::StorageError;

/// Load `path`, falling back to `T::default()` if absent or unreadable.
pub fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable store, starting empty");
            return T::default();
        },
    };

    serde_json::from_str(&text).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "corrupt store, starting empty");
        T::default()
    })
}

/// Serialize `value` to `path` atomically.
pub fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let io_err = |source| StorageError::Io { path: path.to_path_buf(), source };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let json = serde_json::to_vec_pretty(value)
        .map_err(|source| StorageError::Json { path: path.to_path_buf(), source })?;

    let tmp = temp_path(path);
    fs::write(&tmp, json).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

/// Delete `path` if it exists.
pub fn remove(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StorageError::Io { path: path.to_path_buf(), source }),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let value: BTreeMap<String, u32> = load_or_default(&dir.path().join("absent.json"));
        assert!(value.is_empty());
    }

    #[test]
    fn corrupt_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        let value: BTreeMap<String, u32> = load_or_default(&path);
        assert!(value.is_empty());
    }

    #[test]
    fn write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.json");
        let value = BTreeMap::from([("a".to_string(), 1u32)]);

        write_atomic(&path, &value).unwrap();
        assert!(!temp_path(&path).exists());

        let loaded: BTreeMap<String, u32> = load_or_default(&path);
        assert_eq!(loaded, value);

        remove(&path).unwrap();
        remove(&path).unwrap();
        assert!(!path.exists());
    }
}
