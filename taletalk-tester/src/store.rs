use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use taletalk_game::KeyValueStore;

#[derive(Debug, thiserror::Error)]
pub enum FileStoreError {
    #[error("invalid storage key `{0}`")]
    InvalidKey(String),
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Directory-backed store: each key lives in `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) the store directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, FileStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| FileStoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, FileStoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(FileStoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    type Error = FileStoreError;

    fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(FileStoreError::Io { path, source }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        let path = self.path_for(key)?;
        fs::write(&path, value).map_err(|source| FileStoreError::Io { path, source })
    }

    fn remove(&self, key: &str) -> Result<(), Self::Error> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                Err(FileStoreError::Io { path, source: e })
            }
            _ => Ok(()),
        }
    }
}
